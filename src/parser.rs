//! Incremental HTTP/1.1 message parsing
//!
//! The parsers here decompose raw connection bytes into grammar events and
//! hand them to a [`ParseSink`]: one call per header field, one call when the
//! start line and headers are complete, and one call per body fragment. The
//! sink - normally a parser adapter bound to a message - decides what the
//! events mean; the parser only knows the byte grammar and body framing.

use crate::chunked::ChunkedDecoder;
use crate::message::{reason_phrase, Method, Version};
use crate::{Error, Result};

/// The parsed first line of a message, delivered at headers-complete
#[derive(Debug, Clone)]
pub enum StartLine {
    Request {
        method: Method,
        uri: String,
        version: Version,
    },
    Response {
        version: Version,
        status: u16,
        reason: String,
    },
}

/// Callback contract between a parser and a message
///
/// Events always arrive in grammar order: every header field first, then
/// headers-complete exactly once, then zero or more body fragments.
pub trait ParseSink {
    /// A header field was parsed
    ///
    /// An empty `name` is a continuation of the previous field's value.
    fn on_header_field(&mut self, name: &str, value: &str) -> Result<()>;

    /// The start line and all headers have been parsed
    fn on_headers_complete(&mut self, start: &StartLine) -> Result<()>;

    /// A decoded fragment of the message body arrived
    fn on_body_fragment(&mut self, fragment: &[u8]) -> Result<()>;
}

/// Parse an HTTP response status line
///
/// Format: `VERSION STATUS REASON`; the reason phrase may be absent, in which
/// case the canonical phrase for the status is substituted.
pub fn parse_status_line(line: &str) -> Result<(Version, u16, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() < 2 {
        return Err(Error::Malformed(format!("invalid status line: {:?}", line)));
    }

    let version = parts[0].parse::<Version>()?;
    let status = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::InvalidStatus(parts[1].to_string()))?;
    if !(100..600).contains(&status) {
        return Err(Error::InvalidStatus(status.to_string()));
    }
    let reason = if parts.len() == 3 {
        parts[2].to_string()
    } else {
        reason_phrase(status).to_string()
    };

    Ok((version, status, reason))
}

/// Parse an HTTP request line
///
/// Format: `METHOD URI VERSION`.
pub fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::Malformed(format!("invalid request line: {:?}", line)));
    }

    let method = parts[0].parse::<Method>()?;
    let uri = parts[1].to_string();
    let version = parts[2].parse::<Version>()?;

    Ok((method, uri, version))
}

fn parse_header_line(line: &str) -> Result<(String, String)> {
    let Some(colon) = line.find(':') else {
        return Err(Error::Malformed(format!("no colon in header: {:?}", line)));
    };
    let name = line[..colon].trim().to_string();
    let value = line[colon + 1..].trim().to_string();
    if name.is_empty() {
        return Err(Error::InvalidHeader("empty header name".to_string()));
    }
    Ok((name, value))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    StartLine,
    Headers,
    FixedBody,
    ChunkedBody,
    EofBody,
    Complete,
}

/// Body framing derived from the headers as they stream past
#[derive(Default)]
struct Framing {
    content_length: Option<usize>,
    chunked: bool,
}

impl Framing {
    fn note(&mut self, name: &str, value: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("Content-Length") {
            let n = value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::Malformed(format!("invalid Content-Length: {:?}", value)))?;
            self.content_length = Some(n);
        } else if name.eq_ignore_ascii_case("Transfer-Encoding")
            && value.to_ascii_lowercase().contains("chunked")
        {
            self.chunked = true;
        }
        Ok(())
    }
}

/// Incremental HTTP response parser
///
/// Feed connection bytes as they arrive; grammar events are delivered to the
/// sink as soon as they can be decoded. `feed` reports whether the full
/// message (headers and body) has been consumed.
pub struct ResponseParser {
    state: State,
    buffer: Vec<u8>,
    version: Option<Version>,
    status: u16,
    reason: String,
    framing: Framing,
    ignore_body: bool,
    saw_field: bool,
    remaining: usize,
    chunk: ChunkedDecoder,
}

impl ResponseParser {
    /// Create a new response parser
    pub fn new() -> Self {
        ResponseParser {
            state: State::StartLine,
            buffer: Vec::new(),
            version: None,
            status: 0,
            reason: String::new(),
            framing: Framing::default(),
            ignore_body: false,
            saw_field: false,
            remaining: 0,
            chunk: ChunkedDecoder::new(),
        }
    }

    /// Create a parser for the response to a given request method
    ///
    /// `HEAD` and `CONNECT` responses carry no body regardless of headers.
    pub fn for_method(method: Method) -> Self {
        let mut parser = Self::new();
        parser.ignore_body = method.suppresses_response_body();
        parser
    }

    /// Suppress body expectation entirely
    pub fn set_ignore_body(&mut self, ignore: bool) {
        self.ignore_body = ignore;
    }

    /// Feed bytes to the parser
    ///
    /// Returns `Ok(true)` once the complete message has been parsed.
    pub fn feed(&mut self, data: &[u8], sink: &mut dyn ParseSink) -> Result<bool> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                State::StartLine => {
                    let Some(eol) = find_crlf(&self.buffer) else {
                        break;
                    };
                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    let (version, status, reason) = parse_status_line(&line)?;
                    self.version = Some(version);
                    self.status = status;
                    self.reason = reason;
                    self.state = State::Headers;
                }

                State::Headers => {
                    let Some(eol) = find_crlf(&self.buffer) else {
                        break;
                    };
                    if eol == 0 {
                        self.buffer.drain(..2);
                        self.finish_headers(sink)?;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    if line.starts_with(' ') || line.starts_with('\t') {
                        // Folded continuation of the previous field
                        if !self.saw_field {
                            return Err(Error::InvalidHeader(
                                "continuation before any header field".to_string(),
                            ));
                        }
                        sink.on_header_field("", &format!(" {}", line.trim()))?;
                    } else {
                        let (name, value) = parse_header_line(&line)?;
                        self.framing.note(&name, &value)?;
                        self.saw_field = true;
                        sink.on_header_field(&name, &value)?;
                    }
                }

                State::FixedBody => {
                    if self.buffer.is_empty() {
                        break;
                    }
                    let take = self.remaining.min(self.buffer.len());
                    sink.on_body_fragment(&self.buffer[..take])?;
                    self.buffer.drain(..take);
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.state = State::Complete;
                    } else {
                        break;
                    }
                }

                State::ChunkedBody => {
                    if self.buffer.is_empty() {
                        break;
                    }
                    let mut decoded = Vec::new();
                    let (consumed, done) = self.chunk.decode(&self.buffer, &mut decoded)?;
                    if !decoded.is_empty() {
                        sink.on_body_fragment(&decoded)?;
                    }
                    self.buffer.drain(..consumed);
                    if done {
                        self.state = State::Complete;
                    } else {
                        break;
                    }
                }

                State::EofBody => {
                    if !self.buffer.is_empty() {
                        sink.on_body_fragment(&self.buffer)?;
                        self.buffer.clear();
                    }
                    break;
                }

                State::Complete => break,
            }
        }

        Ok(self.state == State::Complete)
    }

    fn finish_headers(&mut self, sink: &mut dyn ParseSink) -> Result<()> {
        let start = StartLine::Response {
            version: self.version.unwrap_or_default(),
            status: self.status,
            reason: std::mem::take(&mut self.reason),
        };
        sink.on_headers_complete(&start)?;

        let status = self.status;
        let bodyless =
            self.ignore_body || status == 204 || status == 304 || (100..200).contains(&status);

        self.state = if bodyless {
            State::Complete
        } else if self.framing.chunked {
            State::ChunkedBody
        } else if let Some(n) = self.framing.content_length {
            if n == 0 {
                State::Complete
            } else {
                self.remaining = n;
                State::FixedBody
            }
        } else {
            // No declared framing: the body runs until the peer closes
            State::EofBody
        };
        Ok(())
    }

    /// Signal end of input from the connection
    ///
    /// Completes an EOF-delimited body; anywhere else in the grammar the end
    /// of input is a premature close.
    pub fn finish(&mut self, _sink: &mut dyn ParseSink) -> Result<()> {
        match self.state {
            State::Complete => Ok(()),
            State::EofBody => {
                self.state = State::Complete;
                Ok(())
            }
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Check if the full message has been parsed
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental HTTP request parser
///
/// Used to consume an already-framed request, e.g. by a test peer. Requests
/// have no EOF-delimited bodies: absent framing headers means no body.
pub struct RequestParser {
    state: State,
    buffer: Vec<u8>,
    method: Option<Method>,
    uri: String,
    version: Option<Version>,
    framing: Framing,
    saw_field: bool,
    remaining: usize,
    chunk: ChunkedDecoder,
}

impl RequestParser {
    /// Create a new request parser
    pub fn new() -> Self {
        RequestParser {
            state: State::StartLine,
            buffer: Vec::new(),
            method: None,
            uri: String::new(),
            version: None,
            framing: Framing::default(),
            saw_field: false,
            remaining: 0,
            chunk: ChunkedDecoder::new(),
        }
    }

    /// Feed bytes to the parser
    ///
    /// Returns `Ok(true)` once the complete request has been parsed.
    pub fn feed(&mut self, data: &[u8], sink: &mut dyn ParseSink) -> Result<bool> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                State::StartLine => {
                    let Some(eol) = find_crlf(&self.buffer) else {
                        break;
                    };
                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    let (method, uri, version) = parse_request_line(&line)?;
                    self.method = Some(method);
                    self.uri = uri;
                    self.version = Some(version);
                    self.state = State::Headers;
                }

                State::Headers => {
                    let Some(eol) = find_crlf(&self.buffer) else {
                        break;
                    };
                    if eol == 0 {
                        self.buffer.drain(..2);
                        self.finish_headers(sink)?;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&self.buffer[..eol]).to_string();
                    self.buffer.drain(..eol + 2);

                    if line.starts_with(' ') || line.starts_with('\t') {
                        if !self.saw_field {
                            return Err(Error::InvalidHeader(
                                "continuation before any header field".to_string(),
                            ));
                        }
                        sink.on_header_field("", &format!(" {}", line.trim()))?;
                    } else {
                        let (name, value) = parse_header_line(&line)?;
                        self.framing.note(&name, &value)?;
                        self.saw_field = true;
                        sink.on_header_field(&name, &value)?;
                    }
                }

                State::FixedBody => {
                    if self.buffer.is_empty() {
                        break;
                    }
                    let take = self.remaining.min(self.buffer.len());
                    sink.on_body_fragment(&self.buffer[..take])?;
                    self.buffer.drain(..take);
                    self.remaining -= take;
                    if self.remaining == 0 {
                        self.state = State::Complete;
                    } else {
                        break;
                    }
                }

                State::ChunkedBody => {
                    if self.buffer.is_empty() {
                        break;
                    }
                    let mut decoded = Vec::new();
                    let (consumed, done) = self.chunk.decode(&self.buffer, &mut decoded)?;
                    if !decoded.is_empty() {
                        sink.on_body_fragment(&decoded)?;
                    }
                    self.buffer.drain(..consumed);
                    if done {
                        self.state = State::Complete;
                    } else {
                        break;
                    }
                }

                State::EofBody | State::Complete => break,
            }
        }

        Ok(self.state == State::Complete)
    }

    fn finish_headers(&mut self, sink: &mut dyn ParseSink) -> Result<()> {
        let start = StartLine::Request {
            method: self.method.unwrap_or(Method::Get),
            uri: std::mem::take(&mut self.uri),
            version: self.version.unwrap_or_default(),
        };
        sink.on_headers_complete(&start)?;

        self.state = if self.framing.chunked {
            State::ChunkedBody
        } else if let Some(n) = self.framing.content_length {
            if n == 0 {
                State::Complete
            } else {
                self.remaining = n;
                State::FixedBody
            }
        } else {
            State::Complete
        };
        Ok(())
    }

    /// Check if the full request has been parsed
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
