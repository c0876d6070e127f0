//! Database connection pooling.
//!
//! [`ConnectionPool`] lends a fixed set of [`ManagedConnection`]s to request
//! handlers, blocking callers while every connection is leased, and repairs
//! dead connections both on checkout and from a background thread.

pub mod error;
pub mod pool;
pub mod tcp;

pub use error::DbError;
pub use pool::{ConnectionPool, ManagedConnection, PoolStatus, PooledConnection, RepairReport, RepairTask};
pub use tcp::TcpConnection;
