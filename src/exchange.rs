//! Write/read protocol
//!
//! One request/response exchange over an exclusively owned connection:
//! serialize the request, half-close for write, drive the connection's bytes
//! through the parser adapter until the response is complete, half-close for
//! read. Failures anywhere along the way are recorded on the response,
//! broadcast to every waiter, and re-raised to the caller.

use crate::adapter::ResponseAdapter;
use crate::connection::Connection;
use crate::message::{Request, Response};
use crate::parser::ResponseParser;
use crate::{Error, Result};

/// Perform one exchange, populating the given empty response
///
/// `response` is typically shared with observer threads before this call so
/// they can block on [`Response::wait_for_headers`] or [`Response::wait`]
/// while the body is still arriving. Whatever the outcome, the response's
/// completion signal is raised at the end; on failure the error is recorded
/// on the response and returned.
pub fn write_and_read<C: Connection>(
    conn: &mut C,
    request: Request,
    response: &Response,
) -> Result<()> {
    match drive(conn, request, response) {
        Ok(()) => {
            response.raise();
            Ok(())
        }
        Err(err) => {
            let _ = conn.close();
            // fail() records the error once and wakes all waiters
            response.fail(err.clone());
            Err(err)
        }
    }
}

/// Perform one exchange and hand back the response
pub fn send<C: Connection>(conn: &mut C, request: Request) -> Result<Response> {
    let response = Response::new();
    write_and_read(conn, request, &response)?;
    Ok(response)
}

fn drive<C: Connection>(conn: &mut C, mut request: Request, response: &Response) -> Result<()> {
    let method = request.method();

    request.finalize_framing();
    let wire = request.to_wire();
    response.attach_request(request);

    write_all(conn, &wire)?;
    conn.close_write()?;

    let mut parser = ResponseParser::for_method(method);
    let mut adapter = ResponseAdapter::new(response.clone());
    let mut buf = [0u8; 4096];

    loop {
        let n = conn.read(&mut buf)?;
        if n == 0 {
            // EOF completes an EOF-delimited body; anywhere else it is a
            // premature close
            parser.finish(&mut adapter)?;
            break;
        }
        if parser.feed(&buf[..n], &mut adapter)? {
            break;
        }
    }

    // Guarantee the closed state even if the parser under-delivered
    response.body().close();
    conn.close_read()?;

    Ok(())
}

fn write_all<C: Connection>(conn: &mut C, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let n = conn.write(data)?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        data = &data[n..];
    }
    Ok(())
}
