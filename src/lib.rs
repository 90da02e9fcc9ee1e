//! h1core - HTTP/1.1 client message engine
//!
//! This crate implements the client side of an HTTP/1.1 exchange: building a
//! request, writing it to a duplex connection, and incrementally parsing the
//! response off the wire while other threads consume the body as it arrives.
//!
//! # Architecture
//!
//! The engine is built from small, composable pieces:
//!
//! - [`Headers`] - ordered name/value pairs with case-insensitive lookup
//! - [`Body`] - a streaming byte buffer shared between one writer and any
//!   number of blocking readers
//! - [`Request`] / [`Response`] - the two message variants
//! - [`ResponseParser`] - incremental byte-grammar parser driving callbacks
//! - `adapter` - turns parser callbacks into message field mutations
//! - `exchange` - the write-request / read-response protocol
//!
//! A [`Response`] is a cheaply cloneable handle. The exchange thread is its
//! only writer; any number of other threads may hold clones and block on
//! [`Response::wait_for_headers`] or [`Response::wait`] while the body is
//! still streaming in.
//!
//! # Examples
//!
//! ```no_run
//! use h1core::{exchange, Method, Request, TcpConnection};
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("127.0.0.1:8080").unwrap();
//! let mut conn = TcpConnection::new(stream);
//!
//! let request = Request::builder()
//!     .method(Method::Get)
//!     .uri("/")
//!     .header("Host", "localhost")
//!     .build();
//!
//! let response = exchange::send(&mut conn, request).unwrap();
//! assert_eq!(response.status(), 200);
//! let body = response.body().read().unwrap();
//! println!("{} body bytes", body.len());
//! ```

pub mod adapter;
pub mod body;
pub mod chunked;
pub mod connection;
pub mod exchange;
pub mod headers;
pub mod message;
pub mod parser;

pub use body::Body;
pub use connection::{Connection, TcpConnection};
pub use exchange::{send, write_and_read};
pub use headers::Headers;
pub use message::{build_request, Method, Request, Response, Version};
pub use parser::{ParseSink, RequestParser, ResponseParser, StartLine};

use std::sync::Arc;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// `Error` is `Clone` so that a failure recorded on an in-flight response can
/// be re-raised to every thread that waits on it, past or future. I/O errors
/// are wrapped in `Arc` for that reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("write to closed body")]
    ClosedBody,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("timeout")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
