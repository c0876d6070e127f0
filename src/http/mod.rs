//! HTTP protocol implementation.
//!
//! An HTTP/1.0 and HTTP/1.1 server front end with keep-alive support.
//!
//! # Architecture
//!
//! - **`parser`**: Incremental request parser fed from a per-connection buffer
//! - **`request`**: HTTP request representation
//! - **`response`**: Mutable response handed to handlers, plus a builder
//! - **`writer`**: Serializes and writes HTTP responses to the client
//! - **`router`**: Exact-path dispatch to application handlers
//! - **`session`**: Drives one parser per connection and produces responses
//! - **`connection`**: Tokio transport for a single TCP connection
//!
//! # Parser State Machine
//!
//! ```text
//!        ┌───────────────────┐
//!        │ ExpectRequestLine │ ← "GET /path?x=1 HTTP/1.1"
//!        └─────────┬─────────┘
//!                  ▼
//!        ┌───────────────────┐
//!        │   ExpectHeaders   │ ← one "Key: Value" line at a time
//!        └─────────┬─────────┘
//!                  │ blank line
//!                  ├─ POST/PUT with Content-Length > 0 → ExpectBody
//!                  └─ otherwise → Complete
//!        ┌───────────────────┐
//!        │    ExpectBody     │ ← waits for all Content-Length bytes
//!        └─────────┬─────────┘
//!                  ▼
//!        ┌───────────────────┐
//!        │     Complete      │ ← request taken, parser reset (keep-alive)
//!        └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pylon::http::router::Router;
//! use pylon::http::request::Request;
//! use pylon::http::response::Response;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = Router::new().route("/hello", |_: &Request, resp: &mut Response| -> anyhow::Result<()> {
//!         resp.set_body("hi");
//!         Ok(())
//!     });
//!     let listener = TcpListener::bind("127.0.0.1:8083").await?;
//!     pylon::server::listener::serve(listener, Arc::new(router)).await
//! }
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod session;
pub mod writer;
