//! HTTP message types
//!
//! This module defines requests and responses. A [`Request`] is a plain
//! mutable value owned by its author until it is sent. A [`Response`] is a
//! shared handle: the exchange that issued the request is its only writer,
//! while any number of observer threads read status and headers and block on
//! the completion signal.

use crate::body::Body;
use crate::headers::Headers;
use crate::{chunked, Error, Result, CRLF};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    /// Whether responses to this method never carry a body
    ///
    /// `HEAD` and `CONNECT` responses have no body regardless of what the
    /// response headers claim.
    pub fn suppresses_response_body(&self) -> bool {
        matches!(self, Method::Head | Method::Connect)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    /// Convert version to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical reason phrase for a status code
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// Whether a status code is one of the redirect codes acted on by callers
///
/// The set is exactly {301, 302, 307, 308}; 303 is deliberately excluded.
pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 307 | 308)
}

/// HTTP request
///
/// Mutable until sent; [`crate::exchange::write_and_read`] consumes it and
/// retains it as the parent of the response it produces.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    version: Version,
    headers: Headers,
    body: Body,
    parent: Option<Response>,
}

impl Request {
    /// Create a new request with an empty, closed body
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Request {
            method,
            uri: uri.into(),
            version: Version::default(),
            headers: Headers::new(),
            body: Body::from_bytes(Bytes::new()),
            parent: None,
        }
    }

    /// Create a builder for constructing requests
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Set the request method
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Get the request target URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Set the request target URI
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Set the HTTP version
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// First value of a header, if present
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// First value of a header, or a default
    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.headers.get_or(name, default)
    }

    /// Set a header, replacing any existing value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Get the body
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replace the body
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// The response that triggered this request, when following a redirect
    pub fn parent(&self) -> Option<&Response> {
        self.parent.as_ref()
    }

    /// Record the response this request was created to follow
    pub fn set_parent(&mut self, response: Response) {
        self.parent = Some(response);
    }

    /// Finalize body framing headers before serialization
    ///
    /// A known non-zero length becomes `Content-Length`; an open body with
    /// unknown length becomes `Transfer-Encoding: chunked`. An empty closed
    /// body adds nothing. Caller-supplied framing headers are left alone.
    /// This is a required pre-write step; serialization itself never adds
    /// framing headers.
    pub fn finalize_framing(&mut self) {
        match self.body.len() {
            Some(0) => {}
            Some(n) => self.headers.set_default("Content-Length", n.to_string()),
            None => self.headers.set_default("Transfer-Encoding", "chunked"),
        }
    }

    /// Serialize the request to wire format
    ///
    /// Start line, headers in collection order, blank line, then the body
    /// bytes - chunk-framed when `Transfer-Encoding: chunked` was finalized.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.uri.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        write_header_block(&mut buf, &self.headers);
        write_framed_body(&mut buf, &self.headers, &self.body);

        buf
    }
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Option<Body>,
    parent: Option<Response>,
}

impl RequestBuilder {
    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the target URI
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the HTTP version
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a fixed body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(Body::from_bytes(body));
        self
    }

    /// Attach a streaming body handle
    ///
    /// An open body is framed as chunked when the request is finalized.
    pub fn stream(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Record the response this request follows up on
    pub fn parent(mut self, response: Response) -> Self {
        self.parent = Some(response);
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        Request {
            method: self.method.unwrap_or(Method::Get),
            uri: self.uri.unwrap_or_else(|| "/".to_string()),
            version: self.version.unwrap_or_default(),
            headers: self.headers,
            body: self.body.unwrap_or_else(|| Body::from_bytes(Bytes::new())),
            parent: self.parent,
        }
    }
}

/// Build a request from its parts
pub fn build_request(
    method: Method,
    uri: impl Into<String>,
    headers: Headers,
    body: impl Into<Bytes>,
) -> Request {
    let mut request = Request::new(method, uri);
    *request.headers_mut() = headers;
    request.set_body(Body::from_bytes(body));
    request
}

/// HTTP response handle
///
/// Constructed empty, populated incrementally by the parser adapter while
/// bytes arrive. Clones share the same state; only the exchange and its
/// adapter mutate it, everyone else observes.
#[derive(Clone)]
pub struct Response {
    shared: Arc<ResponseShared>,
}

struct ResponseShared {
    // 0 until the status line and headers finish parsing
    status: AtomicU16,
    head: Mutex<Head>,
    body: Body,
}

#[derive(Default)]
struct Head {
    version: Version,
    reason: String,
    headers: Headers,
    request: Option<Request>,
}

impl Response {
    /// Create a new empty response
    pub fn new() -> Self {
        Response {
            shared: Arc::new(ResponseShared {
                status: AtomicU16::new(0),
                head: Mutex::new(Head::default()),
                body: Body::new(),
            }),
        }
    }

    /// Create a fully formed response, for serialization
    ///
    /// Intended for test peers and tooling; in-flight responses are built by
    /// the exchange instead.
    pub fn build(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        let response = Response::new();
        {
            let mut head = response.head();
            head.headers = headers;
            head.reason = reason_phrase(status).to_string();
        }
        response.shared.status.store(status, Ordering::Release);
        let content = body.into();
        if !content.is_empty() {
            // new() starts with an open body
            let _ = response.shared.body.write(&content);
        }
        response.shared.body.close();
        response
    }

    fn head(&self) -> MutexGuard<'_, Head> {
        self.shared
            .head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Numeric status code; 0 until headers have been parsed
    pub fn status(&self) -> u16 {
        self.shared.status.load(Ordering::Acquire)
    }

    /// Protocol version of the response
    pub fn version(&self) -> Version {
        self.head().version
    }

    /// Reason phrase from the status line
    pub fn reason(&self) -> String {
        self.head().reason.clone()
    }

    /// Snapshot of the response headers
    pub fn headers(&self) -> Headers {
        self.head().headers.clone()
    }

    /// First value of a header, if present
    pub fn header(&self, name: &str) -> Option<String> {
        self.head().headers.get(name).map(str::to_string)
    }

    /// First value of a header, or a default
    pub fn header_or(&self, name: &str, default: &str) -> String {
        self.header(name).unwrap_or_else(|| default.to_string())
    }

    /// Set a header on a composed response
    ///
    /// For responses being built for serialization; the parser adapter is the
    /// only writer of an in-flight response's headers.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.head().headers.set(name, value);
    }

    /// The streaming body
    pub fn body(&self) -> &Body {
        &self.shared.body
    }

    /// The request that produced this response
    pub fn request(&self) -> Option<Request> {
        self.head().request.clone()
    }

    /// The failure recorded on this response, if any
    pub fn failure(&self) -> Option<Error> {
        self.shared.body.failure()
    }

    /// Whether the status is one of the redirect codes {301, 302, 307, 308}
    pub fn is_redirect(&self) -> bool {
        is_redirect_status(self.status())
    }

    /// Whether the status indicates a client or server error
    pub fn is_error(&self) -> bool {
        self.status() >= 400
    }

    /// Block until the status line and headers have been parsed
    ///
    /// Returns as soon as the status is known, even while the body is still
    /// streaming. Re-raises the recorded failure if the exchange failed.
    pub fn wait_for_headers(&self) -> Result<()> {
        self.shared.body.wait_until(|| self.status() != 0)
    }

    /// Block until the response is complete (body closed)
    ///
    /// Re-raises the recorded failure if the exchange failed.
    pub fn wait(&self) -> Result<()> {
        self.shared.body.wait_until(|| false)
    }

    /// Serialize the response to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let status = self.status();
        let head = self.head();
        let mut buf = Vec::new();

        buf.extend_from_slice(head.version.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(status.to_string().as_bytes());
        buf.push(b' ');
        if head.reason.is_empty() {
            buf.extend_from_slice(reason_phrase(status).as_bytes());
        } else {
            buf.extend_from_slice(head.reason.as_bytes());
        }
        buf.extend_from_slice(CRLF.as_bytes());

        write_header_block(&mut buf, &head.headers);
        write_framed_body(&mut buf, &head.headers, &self.shared.body);

        buf
    }

    /// Append a parsed header token (wire combination rules)
    pub(crate) fn append_header(&self, name: &str, value: &str) {
        self.head().headers.append(name, value);
    }

    /// Record the parsed status line and raise the completion signal
    ///
    /// Headers must already be appended; after the status store, waiters see
    /// the response as headers-ready.
    pub(crate) fn record_head(&self, version: Version, status: u16, reason: &str) {
        {
            let mut head = self.head();
            head.version = version;
            head.reason = reason.to_string();
        }
        self.shared.status.store(status, Ordering::Release);
        self.shared.body.raise();
    }

    /// Attach the originating request
    pub(crate) fn attach_request(&self, request: Request) {
        self.head().request = Some(request);
    }

    /// Record a failure and wake every waiter, current and future
    pub(crate) fn fail(&self, err: Error) {
        self.shared.body.fail(err);
    }

    /// Wake every waiter so it re-checks its predicate
    pub(crate) fn raise(&self) {
        self.shared.body.raise();
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status())
            .field("body", &self.shared.body)
            .finish()
    }
}

fn write_header_block(buf: &mut Vec<u8>, headers: &Headers) {
    for (name, value) in headers.iter() {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());
    }
    buf.extend_from_slice(CRLF.as_bytes());
}

fn write_framed_body(buf: &mut Vec<u8>, headers: &Headers, body: &Body) {
    let content = body.contents();
    let is_chunked = headers
        .get("Transfer-Encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    if is_chunked {
        buf.extend_from_slice(&chunked::encode(&content));
    } else {
        buf.extend_from_slice(&content);
    }
}
