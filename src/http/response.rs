use std::collections::BTreeMap;

/// HTTP status codes produced by the server and its handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 204 No Content
    NoContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 409 Conflict
    Conflict,
    /// 500 Internal Server Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use pylon::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NoContent => 204,
            StatusCode::MovedPermanently => 301,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::Conflict => 409,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::Conflict => "Conflict",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// The response a handler fills in.
///
/// The session creates one per request with the connection decision already
/// made; handlers may override any part of it. `Content-Length` and
/// `Connection` are emitted by the writer from `close_connection` and the
/// body, so handlers should not set them as headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    /// Overrides the reason phrase on the status line when set.
    pub status_message: Option<String>,
    pub close_connection: bool,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    /// A 200 OK response with an empty body.
    pub fn new(close_connection: bool) -> Self {
        Self {
            status: StatusCode::Ok,
            status_message: None,
            close_connection,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn set_close_connection(&mut self, close: bool) {
        self.close_connection = close;
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.add_header("Content-Type", content_type);
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// The text printed after the status code.
    pub fn status_text(&self) -> &str {
        self.status_message
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Creates a 404 Not Found response for `path` that closes the connection.
    pub fn not_found(path: &str) -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .close(true)
            .body(format!("404 Not Found: {path}"))
            .build()
    }

    /// Creates a 400 Bad Request response that closes the connection.
    pub fn bad_request() -> Self {
        ResponseBuilder::new(StatusCode::BadRequest)
            .close(true)
            .body("400 Bad Request")
            .build()
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .body("500 Internal Server Error")
            .build()
    }
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use pylon::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body("{}")
///     .build();
/// assert!(!response.close_connection);
/// ```
pub struct ResponseBuilder {
    inner: Response,
}

impl ResponseBuilder {
    /// Creates a keep-alive response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        let mut inner = Response::new(false);
        inner.status = status;
        Self { inner }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.add_header(key, value);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.inner.set_status_message(message);
        self
    }

    pub fn close(mut self, close: bool) -> Self {
        self.inner.close_connection = close;
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.inner.set_body(body);
        self
    }

    pub fn build(self) -> Response {
        self.inner
    }
}
