//! Plain TCP session to the database host.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::db::error::DbError;
use crate::db::pool::ManagedConnection;

#[derive(Debug)]
pub struct TcpConnection {
    target: String,
    database: String,
    connect_timeout: Duration,
    stream: TcpStream,
}

impl TcpConnection {
    /// `host:port` this connection dials.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

fn dial(target: &str, timeout: Duration) -> Result<TcpStream, DbError> {
    let addrs = target
        .to_socket_addrs()
        .map_err(|_| DbError::Resolve(target.to_string()))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(source) => Err(DbError::Connect {
            addr: target.to_string(),
            source,
        }),
        None => Err(DbError::Resolve(target.to_string())),
    }
}

impl ManagedConnection for TcpConnection {
    type Config = DatabaseConfig;

    fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let target = config.address();
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = dial(&target, connect_timeout)?;
        debug!(target = %target, database = %config.database, "Opened database connection");

        Ok(Self {
            target,
            database: config.database.clone(),
            connect_timeout,
            stream,
        })
    }

    /// Non-blocking peek: EOF or a socket error means the peer is gone,
    /// pending data or `WouldBlock` means it is still there.
    fn ping(&mut self) -> bool {
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }

        let mut byte = [0u8; 1];
        let alive = match self.stream.peek(&mut byte) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        };

        alive && self.stream.set_nonblocking(false).is_ok()
    }

    fn reconnect(&mut self) -> Result<(), DbError> {
        self.stream = dial(&self.target, self.connect_timeout)?;
        info!(target = %self.target, "Reconnected to database");
        Ok(())
    }
}
