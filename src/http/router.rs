//! Exact-path request dispatch.

use std::collections::HashMap;

use tracing::info;

use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};

/// Application code invoked once per completed request.
///
/// Implemented for any `Fn(&Request, &mut Response) -> anyhow::Result<()>`.
/// An `Err` is turned into a 500 by the session.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: &Request, resp: &mut Response) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn call(&self, req: &Request, resp: &mut Response) -> anyhow::Result<()> {
        self(req, resp)
    }
}

pub struct Router {
    routes: HashMap<String, Box<dyn Handler>>,
    fallback: Box<dyn Handler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: Box::new(default_not_found),
        }
    }

    /// Registers `handler` for requests whose path equals `path`. A later
    /// registration for the same path replaces the earlier one.
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.insert(path.into(), Box::new(handler));
        self
    }

    /// Replaces the handler used when no route matches.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.fallback = Box::new(handler);
        self
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn dispatch(&self, req: &Request, resp: &mut Response) -> anyhow::Result<()> {
        info!(method = req.method.as_str(), path = %req.path, "Received request");

        match self.routes.get(&req.path) {
            Some(handler) => handler.call(req, resp),
            None => self.fallback.call(req, resp),
        }
    }
}

fn default_not_found(req: &Request, resp: &mut Response) -> anyhow::Result<()> {
    resp.set_status(StatusCode::NotFound);
    resp.set_status_message("Not Found");
    resp.set_body(format!("404 Not Found: {}", req.path));
    resp.set_close_connection(true);
    Ok(())
}
