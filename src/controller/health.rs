use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::db::{ConnectionPool, DbError, ManagedConnection, PooledConnection};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    database: &'static str,
    pool_capacity: usize,
    pool_idle: usize,
    pool_in_use: usize,
}

/// Reports whether a pooled database connection can be leased and is alive.
pub struct HealthController<C: ManagedConnection> {
    pool: Arc<ConnectionPool<C>>,
    acquire_timeout: Option<Duration>,
}

impl<C: ManagedConnection> HealthController<C> {
    pub fn new(pool: Arc<ConnectionPool<C>>, acquire_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    fn lease(&self) -> Result<PooledConnection<'_, C>, DbError> {
        match self.acquire_timeout {
            Some(timeout) => self.pool.acquire_timeout(timeout),
            None => self.pool.acquire(),
        }
    }

    pub fn check(&self, req: &Request, resp: &mut Response) -> anyhow::Result<()> {
        if req.method != Method::GET {
            resp.set_status(StatusCode::NotFound);
            resp.set_body(format!("404 Not Found: {}", req.path));
            return Ok(());
        }

        let database_up = match self.lease() {
            Ok(mut conn) => conn.ping(),
            Err(DbError::NotInitialized) => return Err(DbError::NotInitialized.into()),
            Err(e) => {
                warn!(error = %e, "Health check could not lease a connection");
                false
            }
        };

        // Status is read after the lease is returned.
        let pool = self.pool.status();
        let body = HealthBody {
            status: if database_up { "ok" } else { "degraded" },
            database: if database_up { "up" } else { "down" },
            pool_capacity: pool.capacity,
            pool_idle: pool.idle,
            pool_in_use: pool.in_use,
        };

        resp.set_status(if database_up {
            StatusCode::Ok
        } else {
            StatusCode::ServiceUnavailable
        });
        resp.set_content_type("application/json");
        resp.set_body(serde_json::to_vec(&body)?);
        Ok(())
    }
}
