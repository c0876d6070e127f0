use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::router::Router;
use crate::http::session::{ConnectionSession, SessionOutput};
use crate::http::writer::ResponseWriter;

const READ_BUFFER_SIZE: usize = 4096;

pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    session: Option<ConnectionSession>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing,
    Writing(SessionOutput),
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, router: Arc<Router>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            session: Some(ConnectionSession::new(router)),
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    self.buffer.reserve(READ_BUFFER_SIZE);
                    let n = self.stream.read_buf(&mut self.buffer).await?;

                    self.state = if n == 0 {
                        // Client closed connection
                        ConnectionState::Closed
                    } else {
                        ConnectionState::Processing
                    };
                }

                ConnectionState::Processing => {
                    let output = self.process().await?;
                    self.state = ConnectionState::Writing(output);
                }

                ConnectionState::Writing(output) => {
                    for bytes in output.responses.drain(..) {
                        ResponseWriter::from_bytes(bytes)
                            .write_to_stream(&mut self.stream)
                            .await?;
                    }

                    if output.close {
                        self.stream.shutdown().await?;
                        self.state = ConnectionState::Closed;
                    } else {
                        self.state = ConnectionState::Reading;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs the session against the buffered bytes off the async workers,
    /// since handlers may block on the database pool.
    async fn process(&mut self) -> anyhow::Result<SessionOutput> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| anyhow::anyhow!("connection session already in use"))?;
        let mut buffer = std::mem::take(&mut self.buffer);

        let (session, buffer, output) = tokio::task::spawn_blocking(move || {
            let output = session.on_data(&mut buffer);
            (session, buffer, output)
        })
        .await?;

        self.session = Some(session);
        self.buffer = buffer;
        Ok(output)
    }
}
