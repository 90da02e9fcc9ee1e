//! Parser adapters
//!
//! The glue between the byte-grammar parser and a message: each parsed token
//! becomes a header append or a body write on the bound message. The adapter
//! owns the redirect rule - a redirect response's body is reset at
//! headers-complete, before any consumer could have started reading it, so a
//! later read never blocks on stale redirect content.

use crate::message::{is_redirect_status, Request, Response};
use crate::parser::{ParseSink, StartLine};
use crate::{Error, Result};

/// Binds a parser to a shared [`Response`]
///
/// The adapter and the exchange driving it are the response's only writers.
pub struct ResponseAdapter {
    response: Response,
}

impl ResponseAdapter {
    /// Create an adapter feeding the given response handle
    pub fn new(response: Response) -> Self {
        ResponseAdapter { response }
    }
}

impl ParseSink for ResponseAdapter {
    fn on_header_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.response.append_header(name, value);
        Ok(())
    }

    fn on_headers_complete(&mut self, start: &StartLine) -> Result<()> {
        let StartLine::Response {
            version,
            status,
            reason,
        } = start
        else {
            return Err(Error::Malformed("expected a status line".to_string()));
        };

        if is_redirect_status(*status) {
            // Discard whatever body the redirect carries; the caller's
            // payload of interest lives at the redirect target.
            self.response.body().reset();
        }
        self.response.record_head(*version, *status, reason);
        Ok(())
    }

    fn on_body_fragment(&mut self, fragment: &[u8]) -> Result<()> {
        self.response.body().write(fragment)
    }
}

/// Binds a parser to a [`Request`] being reconstructed from wire bytes
///
/// Used when consuming an already-framed request, e.g. by a test peer.
pub struct RequestAdapter {
    request: Request,
}

impl RequestAdapter {
    /// Create an adapter collecting into a fresh request
    pub fn new() -> Self {
        let mut request = Request::builder().build();
        request.set_body(crate::Body::new());
        RequestAdapter { request }
    }

    /// Finish and return the reconstructed request
    pub fn into_request(self) -> Request {
        self.request.body().close();
        self.request
    }
}

impl Default for RequestAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseSink for RequestAdapter {
    fn on_header_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.request.headers_mut().append(name, value);
        Ok(())
    }

    fn on_headers_complete(&mut self, start: &StartLine) -> Result<()> {
        let StartLine::Request {
            method,
            uri,
            version,
        } = start
        else {
            return Err(Error::Malformed("expected a request line".to_string()));
        };

        self.request.set_method(*method);
        self.request.set_uri(uri.clone());
        self.request.set_version(*version);
        Ok(())
    }

    fn on_body_fragment(&mut self, fragment: &[u8]) -> Result<()> {
        self.request.body().write(fragment)
    }
}
