//! Streaming message body
//!
//! A [`Body`] is an append-only byte sink shared between a single writer (the
//! parser adapter or the request author) and any number of readers. Readers
//! block until the body closes or the owning message records a failure.
//!
//! The body carries the message's one broadcast signal: closing, failing and
//! headers-complete all notify the same condition variable, and every waiter
//! re-checks its own predicate after waking.

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Streaming body handle
///
/// Cloning a `Body` produces another handle onto the same buffer; clones are
/// cheap and safe to hand to other threads.
#[derive(Clone)]
pub struct Body {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    signal: Condvar,
}

#[derive(Default)]
struct State {
    buf: BytesMut,
    closed: bool,
    failure: Option<Error>,
}

impl Body {
    /// Create a new open, empty body
    ///
    /// An open body has an unknown length until it is closed.
    pub fn new() -> Self {
        Body {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                signal: Condvar::new(),
            }),
        }
    }

    /// Create a body that is already closed over the given content
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let body = Body::new();
        {
            let mut st = body.lock();
            st.buf.extend_from_slice(&content.into());
            st.closed = true;
        }
        body
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes to an open body
    ///
    /// Fails with [`Error::ClosedBody`] if the body has already been closed.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut st = self.lock();
        if st.closed {
            return Err(Error::ClosedBody);
        }
        st.buf.extend_from_slice(data);
        Ok(())
    }

    /// Close the body, fixing its final length
    ///
    /// Idempotent. Wakes every thread blocked in [`Body::read`] or waiting on
    /// the owning message.
    pub fn close(&self) {
        {
            let mut st = self.lock();
            st.closed = true;
        }
        self.shared.signal.notify_all();
    }

    /// Whether the body has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Known byte count, or `None` while the length is still unknown
    ///
    /// `None` means the body is open and should be framed as chunked on the
    /// wire. Once closed the length is fixed.
    pub fn len(&self) -> Option<usize> {
        let st = self.lock();
        st.closed.then_some(st.buf.len())
    }

    /// Read the full content, blocking until the body closes
    ///
    /// If the body is already closed this returns immediately. If a failure
    /// was recorded on the owning message, that failure is re-raised instead
    /// of returning partial content.
    pub fn read(&self) -> Result<Bytes> {
        let mut st = self.lock();
        loop {
            if let Some(err) = &st.failure {
                return Err(err.clone());
            }
            if st.closed {
                return Ok(Bytes::copy_from_slice(&st.buf));
            }
            st = self
                .shared
                .signal
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Snapshot of the bytes buffered so far, regardless of state
    ///
    /// Serialization uses this; it never blocks.
    pub(crate) fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().buf)
    }

    /// Discard buffered bytes and return to the open state
    ///
    /// Redirect handling uses this before any consumer has begun reading.
    pub(crate) fn reset(&self) {
        let mut st = self.lock();
        st.buf.clear();
        st.closed = false;
    }

    /// Record a failure and wake every waiter
    ///
    /// The first recorded failure wins; later ones are dropped.
    pub(crate) fn fail(&self, err: Error) {
        {
            let mut st = self.lock();
            if st.failure.is_none() {
                st.failure = Some(err);
            }
        }
        self.shared.signal.notify_all();
    }

    /// The recorded failure, if any
    pub(crate) fn failure(&self) -> Option<Error> {
        self.lock().failure.clone()
    }

    /// Wake every waiter so it re-checks its predicate
    ///
    /// The state lock is taken and released first: a waiter checks its
    /// predicate and parks on the condvar under that lock, so a broadcast
    /// that skipped the lock could land in between and be lost.
    pub(crate) fn raise(&self) {
        drop(self.lock());
        self.shared.signal.notify_all();
    }

    /// Block until the body closes, `ready` reports true, or a failure is
    /// recorded
    ///
    /// `ready` is re-evaluated after every wakeup; it must not touch this
    /// body's own lock.
    pub(crate) fn wait_until(&self, ready: impl Fn() -> bool) -> Result<()> {
        let mut st = self.lock();
        loop {
            if let Some(err) = &st.failure {
                return Err(err.clone());
            }
            if st.closed || ready() {
                return Ok(());
            }
            st = self
                .shared
                .signal
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("Body")
            .field("buffered", &st.buf.len())
            .field("closed", &st.closed)
            .field("failed", &st.failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_then_close_fixes_length() {
        let body = Body::new();
        assert_eq!(body.len(), None);

        body.write(b"hello ").unwrap();
        body.write(b"world").unwrap();
        assert_eq!(body.len(), None);

        body.close();
        assert_eq!(body.len(), Some(11));
        assert_eq!(body.read().unwrap().as_ref(), b"hello world");
    }

    #[test]
    fn test_write_after_close_fails() {
        let body = Body::new();
        body.close();
        assert!(matches!(body.write(b"late"), Err(Error::ClosedBody)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let body = Body::new();
        body.write(b"data").unwrap();
        body.close();
        body.close();
        assert_eq!(body.len(), Some(4));
    }

    #[test]
    fn test_read_blocks_until_close() {
        let body = Body::new();
        let reader = body.clone();

        let handle = thread::spawn(move || reader.read().unwrap());

        thread::sleep(Duration::from_millis(50));
        body.write(b"streamed").unwrap();
        body.close();

        assert_eq!(handle.join().unwrap().as_ref(), b"streamed");
    }

    #[test]
    fn test_failure_wakes_blocked_reader() {
        let body = Body::new();
        let reader = body.clone();

        let handle = thread::spawn(move || reader.read());

        thread::sleep(Duration::from_millis(50));
        body.fail(Error::ConnectionClosed);

        assert!(matches!(handle.join().unwrap(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_failure_reraised_to_late_reader() {
        let body = Body::new();
        body.fail(Error::Timeout);
        assert!(matches!(body.read(), Err(Error::Timeout)));
    }

    #[test]
    fn test_first_failure_wins() {
        let body = Body::new();
        body.fail(Error::Timeout);
        body.fail(Error::ConnectionClosed);
        assert!(matches!(body.read(), Err(Error::Timeout)));
    }

    #[test]
    fn test_raise_wakes_predicate_waiter() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let body = Body::new();
        let flag = Arc::new(AtomicBool::new(false));

        let waiter_body = body.clone();
        let waiter_flag = flag.clone();
        let handle =
            thread::spawn(move || waiter_body.wait_until(|| waiter_flag.load(Ordering::Acquire)));

        thread::sleep(Duration::from_millis(50));
        flag.store(true, Ordering::Release);
        body.raise();

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_reset_reopens() {
        let body = Body::new();
        body.write(b"redirect noise").unwrap();
        body.reset();

        assert_eq!(body.len(), None);
        body.write(b"real").unwrap();
        body.close();
        assert_eq!(body.read().unwrap().as_ref(), b"real");
    }

    #[test]
    fn test_from_bytes_is_closed() {
        let body = Body::from_bytes(&b"fixed"[..]);
        assert!(body.is_closed());
        assert_eq!(body.len(), Some(5));
        assert_eq!(body.read().unwrap().as_ref(), b"fixed");
    }

    #[test]
    fn test_multiple_readers_after_close() {
        let body = Body::from_bytes(&b"shared"[..]);
        let a = body.clone();
        let b = body.clone();
        assert_eq!(a.read().unwrap().as_ref(), b"shared");
        assert_eq!(b.read().unwrap().as_ref(), b"shared");
    }
}
