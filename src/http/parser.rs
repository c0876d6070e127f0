//! Incremental HTTP/1.x request parser.
//!
//! The caller owns the accumulation buffer and hands it to
//! [`RequestParser::feed`] every time more bytes arrive. The parser only
//! splits off lines and bodies that are fully present; a partial tail stays
//! in the buffer untouched for the next call.

use std::mem;
use std::time::SystemTime;

use bytes::{Buf, BytesMut};

use crate::http::request::{Method, Request, Version};

/// Longest request line or header line accepted, terminator excluded.
pub const MAX_LINE_LEN: usize = 8 * 1024;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("unrecognized method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("Content-Length required for this method")]
    MissingContentLength,
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    #[error("line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
}

/// Where the parser is within the current request.
///
/// Only ever moves forward, except for an explicit [`RequestParser::reset`]
/// after `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    ExpectRequestLine,
    ExpectHeaders,
    ExpectBody,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The buffer ends mid-line or mid-body.
    NeedMoreData,
    /// A full request is available through [`RequestParser::request`].
    Complete,
    SyntaxError(ParseError),
}

enum Step {
    Advanced,
    Pending,
}

/// Per-connection request parser.
#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
    request: Request,
    content_length: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::ExpectRequestLine,
            request: Request::default(),
            content_length: 0,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// The request built so far. Only meaningful once `feed` returned
    /// [`ParseOutcome::Complete`].
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Moves the completed request out and resets the parser for the next
    /// request on the same connection.
    pub fn take_request(&mut self) -> Request {
        let request = mem::take(&mut self.request);
        self.reset();
        request
    }

    /// Returns to `ExpectRequestLine` and forgets everything about the
    /// previous request.
    pub fn reset(&mut self) {
        self.state = ParserState::ExpectRequestLine;
        self.request = Request::default();
        self.content_length = 0;
    }

    /// Consumes as much of `buf` as forms complete protocol elements.
    ///
    /// Safe to call again with the same buffer after more bytes were
    /// appended: already consumed bytes are gone from `buf` and partially
    /// received elements were never taken out of it. Once `Complete`, further
    /// calls consume nothing until the parser is reset.
    pub fn feed(&mut self, buf: &mut BytesMut) -> ParseOutcome {
        loop {
            let step = match self.state {
                ParserState::ExpectRequestLine => self.expect_request_line(buf),
                ParserState::ExpectHeaders => self.expect_header(buf),
                ParserState::ExpectBody => self.expect_body(buf),
                ParserState::Complete => return ParseOutcome::Complete,
            };

            match step {
                Ok(Step::Advanced) => continue,
                Ok(Step::Pending) => return ParseOutcome::NeedMoreData,
                Err(e) => return ParseOutcome::SyntaxError(e),
            }
        }
    }

    fn expect_request_line(&mut self, buf: &mut BytesMut) -> Result<Step, ParseError> {
        let Some(line) = take_line(buf)? else {
            return Ok(Step::Pending);
        };
        let line = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidRequestLine)?;

        let (method, rest) = line
            .split_once(' ')
            .ok_or(ParseError::InvalidRequestLine)?;
        self.request.method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;

        let (target, version) = rest
            .split_once(' ')
            .ok_or(ParseError::InvalidRequestLine)?;

        match target.split_once('?') {
            Some((path, query)) => {
                self.request.path = path.to_string();
                parse_query(query, &mut self.request);
            }
            None => self.request.path = target.to_string(),
        }

        self.request.version = parse_version(version)?;
        self.request.receive_time = SystemTime::now();
        self.state = ParserState::ExpectHeaders;
        Ok(Step::Advanced)
    }

    fn expect_header(&mut self, buf: &mut BytesMut) -> Result<Step, ParseError> {
        let Some(line) = take_line(buf)? else {
            return Ok(Step::Pending);
        };

        if line.is_empty() {
            self.finish_headers()?;
            return Ok(Step::Advanced);
        }

        let line = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidHeader)?;
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        self.request
            .headers
            .insert(key.trim().to_string(), value.trim().to_string());
        Ok(Step::Advanced)
    }

    fn finish_headers(&mut self) -> Result<(), ParseError> {
        if !self.request.method.expects_body() {
            self.state = ParserState::Complete;
            return Ok(());
        }

        let declared = self
            .request
            .declared_content_length()?
            .ok_or(ParseError::MissingContentLength)?;
        self.content_length = declared
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?;

        self.state = if self.content_length > 0 {
            ParserState::ExpectBody
        } else {
            ParserState::Complete
        };
        Ok(())
    }

    fn expect_body(&mut self, buf: &mut BytesMut) -> Result<Step, ParseError> {
        if buf.len() < self.content_length {
            return Ok(Step::Pending);
        }

        self.request.body = buf.split_to(self.content_length).to_vec();
        self.state = ParserState::Complete;
        Ok(Step::Advanced)
    }
}

/// Splits one CRLF-terminated line off the front of `buf`, dropping the
/// terminator. Leaves `buf` alone when no full line is present.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match buf.windows(CRLF.len()).position(|w| w == CRLF) {
        Some(end) if end > MAX_LINE_LEN => Err(ParseError::LineTooLong),
        Some(end) => {
            let line = buf.split_to(end);
            buf.advance(CRLF.len());
            Ok(Some(line))
        }
        None if buf.len() > MAX_LINE_LEN + 1 => Err(ParseError::LineTooLong),
        None => Ok(None),
    }
}

// "HTTP/1." followed by exactly one of '0' or '1'.
fn parse_version(token: &str) -> Result<Version, ParseError> {
    match token.as_bytes() {
        b"HTTP/1.1" => Ok(Version::Http11),
        b"HTTP/1.0" => Ok(Version::Http10),
        _ => Err(ParseError::InvalidVersion),
    }
}

fn parse_query(raw: &str, request: &mut Request) {
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        request.query.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
        let mut parser = RequestParser::new();

        assert_eq!(parser.feed(&mut buf), ParseOutcome::Complete);
        assert_eq!(parser.request().path, "/");
        assert_eq!(parser.request().header("Host"), Some("example.com"));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_line_is_left_in_buffer() {
        let mut buf = BytesMut::from(&b"GET /a HTTP/1.1\r\nHo"[..]);
        let mut parser = RequestParser::new();

        assert_eq!(parser.feed(&mut buf), ParseOutcome::NeedMoreData);
        assert_eq!(parser.state(), ParserState::ExpectHeaders);
        assert_eq!(&buf[..], b"Ho");
    }

    #[test]
    fn version_must_be_exact() {
        assert_eq!(parse_version("HTTP/1.1"), Ok(Version::Http11));
        assert_eq!(parse_version("HTTP/1.0"), Ok(Version::Http10));
        assert!(parse_version("HTTP/1.2").is_err());
        assert!(parse_version("HTTP/2.0").is_err());
        assert!(parse_version("HTTP/1.10").is_err());
        assert!(parse_version("http/1.1").is_err());
    }

    #[test]
    fn overlong_unterminated_line_is_rejected() {
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LEN + 2].as_slice());
        let mut parser = RequestParser::new();

        assert_eq!(
            parser.feed(&mut buf),
            ParseOutcome::SyntaxError(ParseError::LineTooLong)
        );
    }
}
