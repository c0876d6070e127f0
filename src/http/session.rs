//! Transport-independent glue between a byte stream and the router.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, error, warn};

use crate::http::parser::{ParseOutcome, RequestParser};
use crate::http::response::Response;
use crate::http::router::Router;
use crate::http::writer::{BAD_REQUEST_CLOSE, serialize_response};

/// What the transport must do after a delivery.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SessionOutput {
    /// Serialized responses, in request order.
    pub responses: Vec<Vec<u8>>,
    /// Close the connection once `responses` are written.
    pub close: bool,
}

/// Owns the parser for one live connection.
pub struct ConnectionSession {
    parser: RequestParser,
    router: Arc<Router>,
    closed: bool,
}

impl ConnectionSession {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            parser: RequestParser::new(),
            router,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    /// Handles every complete request currently in `buf`, leaving any
    /// partial trailing request for the next delivery.
    ///
    /// Once a response closes the connection nothing more is read; the
    /// remaining bytes are abandoned with the connection.
    pub fn on_data(&mut self, buf: &mut BytesMut) -> SessionOutput {
        let mut out = SessionOutput::default();
        if self.closed {
            out.close = true;
            return out;
        }

        loop {
            match self.parser.feed(buf) {
                ParseOutcome::NeedMoreData => break,
                ParseOutcome::SyntaxError(e) => {
                    warn!(error = %e, "Rejecting malformed request");
                    out.responses.push(BAD_REQUEST_CLOSE.to_vec());
                    self.closed = true;
                    break;
                }
                ParseOutcome::Complete => {
                    let response = self.respond();
                    out.responses.push(serialize_response(&response));
                    if response.close_connection {
                        self.closed = true;
                        break;
                    }
                    if buf.is_empty() {
                        break;
                    }
                }
            }
        }

        out.close = self.closed;
        out
    }

    fn respond(&mut self) -> Response {
        let request = self.parser.take_request();
        let mut response = Response::new(!request.keep_alive());

        let dispatched =
            panic::catch_unwind(AssertUnwindSafe(|| self.router.dispatch(&request, &mut response)));
        match dispatched {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(
                    method = request.method.as_str(),
                    path = %request.path,
                    error = %e,
                    "Handler failed"
                );
                let close = response.close_connection;
                response = Response::internal_error();
                response.close_connection = close;
            }
            Err(_) => {
                error!(
                    method = request.method.as_str(),
                    path = %request.path,
                    "Handler panicked"
                );
                response = Response::internal_error();
                response.close_connection = true;
            }
        }

        debug!(
            status = response.status.as_u16(),
            close = response.close_connection,
            "Response ready"
        );
        response
    }
}
