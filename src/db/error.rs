use std::io;
use std::time::Duration;

/// Errors produced by the connection pool and its backends.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `acquire` was called before `initialize` succeeded.
    #[error("connection pool not initialized")]
    NotInitialized,

    /// No connection became free within the bounded wait.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Host name did not resolve to any socket address.
    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
