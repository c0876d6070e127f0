use std::collections::HashMap;
use std::time::SystemTime;

use crate::http::parser::ParseError;

/// HTTP request methods.
///
/// `Unknown` only appears on a request that has not finished its request
/// line yet; the parser rejects unrecognized method tokens outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    #[default]
    Unknown,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, typically uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use pylon::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("PATCH"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::Unknown => "UNKNOWN",
        }
    }

    /// Whether a request with this method must declare `Content-Length`.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::POST | Method::PUT)
    }
}

/// Protocol versions accepted on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Represents a parsed HTTP request from a client.
///
/// Built incrementally by [`RequestParser`](crate::http::parser::RequestParser)
/// and only read once parsing completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path without the query string (e.g., "/index.html")
    pub path: String,
    /// Query parameters; for a repeated key the last value wins
    pub query: HashMap<String, String>,
    pub version: Version,
    /// Request headers, keys exactly as received (trimmed)
    pub headers: HashMap<String, String>,
    /// Request body, exactly `Content-Length` bytes
    pub body: Vec<u8>,
    /// When the request line was accepted
    pub receive_time: SystemTime,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::Unknown,
            path: String::new(),
            query: HashMap::new(),
            version: Version::Http11,
            headers: HashMap::new(),
            body: Vec::new(),
            receive_time: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Builder for constructing Request objects, mostly useful for handler tests.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Version,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            query: self.query,
            version: self.version,
            headers: self.headers,
            body: self.body,
            receive_time: SystemTime::now(),
        })
    }
}

impl Request {
    /// Retrieves a header value by its exact name.
    ///
    /// # Returns
    ///
    /// `Some(&str)` with the header value if present, `None` otherwise.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    /// Retrieves a query parameter by name.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|v| v.as_str())
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 unless a single distinct value is declared and it parses.
    pub fn content_length(&self) -> usize {
        self.declared_content_length()
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// The raw `Content-Length` value under any casing of the key.
    ///
    /// Differently cased copies must agree, otherwise body framing would
    /// depend on map iteration order.
    pub(crate) fn declared_content_length(&self) -> Result<Option<&str>, ParseError> {
        let mut declared: Option<&str> = None;
        for (key, value) in &self.headers {
            if !key.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            match declared {
                Some(seen) if seen != value.as_str() => {
                    return Err(ParseError::InvalidContentLength);
                }
                _ => declared = Some(value),
            }
        }
        Ok(declared)
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// `Connection: close` always closes. HTTP/1.0 closes unless the client
    /// sent `Connection: Keep-Alive`. Everything else stays open.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("Connection");
        let close = connection.is_some_and(|v| v.eq_ignore_ascii_case("close"))
            || (self.version == Version::Http10
                && !connection.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")));
        !close
    }
}
