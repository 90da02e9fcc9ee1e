//! Connection abstraction
//!
//! The exchange consumes a connection only through this narrow contract:
//! write bytes, read bytes, half-close each direction, close. A connection
//! is exclusively owned by one exchange for the duration of one
//! request/response cycle; pooling and socket lifecycle live elsewhere.

use crate::{Error, Result};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Duplex byte connection consumed by the exchange
pub trait Connection {
    /// Write bytes, returning how many were accepted
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Read bytes; 0 means the peer finished sending
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Half-close the write direction (no more request data)
    fn close_write(&mut self) -> Result<()>;

    /// Half-close the read direction
    fn close_read(&mut self) -> Result<()>;

    /// Close both directions
    fn close(&mut self) -> Result<()>;

    /// Whether the connection is still open
    fn is_open(&self) -> bool;
}

/// Plain TCP connection with poll-based timeouts
pub struct TcpConnection {
    stream: TcpStream,
    timeout: Option<Duration>,
    open: bool,
}

impl TcpConnection {
    /// Wrap a TCP stream with the default 10 second timeout
    pub fn new(stream: TcpStream) -> Self {
        TcpConnection {
            stream,
            timeout: Some(Duration::from_secs(10)),
            open: true,
        }
    }

    /// Set the timeout for read and write readiness
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn poll(&self, events: libc::c_short) -> Result<()> {
        let mut pfd = libc::pollfd {
            fd: self.stream.as_raw_fd(),
            events,
            revents: 0,
        };

        let timeout_ms = self
            .timeout
            .map(|d| d.as_millis() as libc::c_int)
            .unwrap_or(-1);

        // SAFETY: pfd is a valid pollfd for the lifetime of the call
        let result = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };

        if result < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }
        if result == 0 {
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

/// Treat "already disconnected" as success when shutting down a direction
fn ignore_not_connected(result: io::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

impl Connection for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.poll(libc::POLLOUT)?;
        self.stream.write(buf).map_err(Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.poll(libc::POLLIN)?;
        self.stream.read(buf).map_err(Error::from)
    }

    fn close_write(&mut self) -> Result<()> {
        ignore_not_connected(self.stream.shutdown(Shutdown::Write))
    }

    fn close_read(&mut self) -> Result<()> {
        ignore_not_connected(self.stream.shutdown(Shutdown::Read))
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        ignore_not_connected(self.stream.shutdown(Shutdown::Both))
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_read_and_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"ping");
            stream.write_all(b"pong").unwrap();
        });

        let mut conn = TcpConnection::new(TcpStream::connect(addr).unwrap());
        assert!(conn.is_open());

        let n = conn.write(b"ping").unwrap();
        assert_eq!(n, 4);

        let mut buf = [0u8; 4];
        let n = conn.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");

        handle.join().unwrap();
    }

    #[test]
    fn test_close_write_signals_eof_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        let mut conn = TcpConnection::new(TcpStream::connect(addr).unwrap());
        conn.write(b"done").unwrap();
        conn.close_write().unwrap();

        assert_eq!(handle.join().unwrap(), b"done");
    }

    #[test]
    fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut conn = TcpConnection::new(TcpStream::connect(addr).unwrap());
        conn.set_timeout(Some(Duration::from_millis(50)));

        let mut buf = [0u8; 16];
        assert!(matches!(conn.read(&mut buf), Err(Error::Timeout)));

        handle.join().unwrap();
    }

    #[test]
    fn test_close_marks_not_open() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let _ = listener.accept().unwrap();
        });

        let mut conn = TcpConnection::new(TcpStream::connect(addr).unwrap());
        conn.close().unwrap();
        assert!(!conn.is_open());

        handle.join().unwrap();
    }
}
