//! Integration tests for the exchange protocol
//!
//! These tests drive full request/response cycles over real sockets, with
//! the peer implemented on a thread and observer threads sharing the
//! in-flight response.

use h1core::adapter::RequestAdapter;
use h1core::{
    exchange, Body, Error, Method, Request, RequestParser, Response, TcpConnection,
};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn connect(addr: SocketAddr) -> TcpConnection {
    TcpConnection::new(TcpStream::connect(addr).unwrap())
}

/// Read the request side of the stream until the client half-closes
fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    buf
}

#[test]
fn test_full_cycle_with_concurrent_header_waiter() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        // Headers first, body only after a pause
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n")
            .unwrap();
        thread::sleep(Duration::from_millis(300));
        stream.write_all(b"0123456789").unwrap();
    });

    let response = Response::new();
    let observer = response.clone();
    let (tx, rx) = mpsc::channel();

    let watcher = thread::spawn(move || {
        observer.wait_for_headers().unwrap();
        // Headers are visible while the body is still streaming
        tx.send((observer.status(), observer.body().is_closed()))
            .unwrap();
        observer.wait().unwrap();
        observer.body().read().unwrap()
    });

    let mut conn = connect(addr);
    let request = Request::builder()
        .method(Method::Get)
        .uri("/slow")
        .header("Host", "localhost")
        .build();
    exchange::write_and_read(&mut conn, request, &response).unwrap();

    let (status, body_closed_at_headers) = rx.recv().unwrap();
    assert_eq!(status, 200);
    assert!(!body_closed_at_headers);

    assert_eq!(watcher.join().unwrap().as_ref(), b"0123456789");
    assert_eq!(response.body().len(), Some(10));

    server.join().unwrap();
}

#[test]
fn test_chunked_response_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .unwrap();
        for chunk in [&b"Hello"[..], &b", "[..], &b"chunked world"[..]] {
            stream
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .unwrap();
            stream.write_all(chunk).unwrap();
            stream.write_all(b"\r\n").unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        stream.write_all(b"0\r\n\r\n").unwrap();
    });

    let mut conn = connect(addr);
    let request = Request::builder().uri("/chunked").build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.body().read().unwrap().as_ref(),
        b"Hello, chunked world"
    );
    // Unknown length fixed only at close
    assert_eq!(response.body().len(), Some(20));

    server.join().unwrap();
}

#[test]
fn test_failure_broadcast_to_all_waiters() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        // Promise 100 bytes, deliver 7, then disappear
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
            .unwrap();
    });

    let response = Response::new();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let observer = response.clone();
            thread::spawn(move || observer.wait())
        })
        .collect();

    let mut conn = connect(addr);
    let request = Request::builder().uri("/flaky").build();
    let result = exchange::write_and_read(&mut conn, request, &response);
    assert!(matches!(result, Err(Error::ConnectionClosed)));

    // Every blocked waiter sees the same failure
    for waiter in waiters {
        assert!(matches!(
            waiter.join().unwrap(),
            Err(Error::ConnectionClosed)
        ));
    }

    // And so does a waiter that arrives afterwards
    assert!(matches!(response.wait(), Err(Error::ConnectionClosed)));
    assert!(matches!(
        response.wait_for_headers(),
        Err(Error::ConnectionClosed)
    ));

    server.join().unwrap();
}

#[test]
fn test_head_request_has_no_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let raw = read_request(&mut stream);
        assert!(raw.starts_with(b"HEAD /doc HTTP/1.1\r\n"));

        // Headers imply a body; none follows and none must be expected
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n")
            .unwrap();
    });

    let mut conn = connect(addr);
    let request = Request::builder().method(Method::Head).uri("/doc").build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.header("Content-Length"), Some("42".to_string()));
    assert_eq!(response.body().len(), Some(0));

    server.join().unwrap();
}

#[test]
fn test_redirect_detection_and_parent_chain() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        stream
            .write_all(
                b"HTTP/1.1 301 Moved Permanently\r\nLocation: /moved\r\nContent-Length: 0\r\n\r\n",
            )
            .unwrap();
    });

    let mut conn = connect(addr);
    let request = Request::builder().uri("/old").build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert!(response.is_redirect());
    assert_eq!(response.header("Location"), Some("/moved".to_string()));

    // Following the redirect is the caller's decision; the engine only
    // carries the chain
    let follow_up = Request::builder()
        .method(Method::Get)
        .uri(response.header_or("Location", "/"))
        .parent(response.clone())
        .build();

    assert_eq!(follow_up.parent().map(Response::status), Some(301));
    assert_eq!(
        follow_up
            .parent()
            .and_then(Response::request)
            .map(|r| r.uri().to_string()),
        Some("/old".to_string())
    );

    server.join().unwrap();
}

#[test]
fn test_post_with_fixed_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let raw = read_request(&mut stream);

        let mut parser = RequestParser::new();
        let mut adapter = RequestAdapter::new();
        assert!(parser.feed(&raw, &mut adapter).unwrap());
        let seen = adapter.into_request();

        assert_eq!(seen.method(), Method::Post);
        assert_eq!(seen.header("Content-Length"), Some("9"));
        assert_eq!(seen.body().read().unwrap().as_ref(), b"test data");

        stream
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
    });

    let mut conn = connect(addr);
    let request = Request::builder()
        .method(Method::Post)
        .uri("/data")
        .header("Host", "localhost")
        .body(&b"test data"[..])
        .build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert_eq!(response.status(), 201);

    server.join().unwrap();
}

#[test]
fn test_post_with_unknown_length_body_goes_chunked() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let raw = read_request(&mut stream);
        let text = String::from_utf8_lossy(&raw).to_string();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));

        let mut parser = RequestParser::new();
        let mut adapter = RequestAdapter::new();
        assert!(parser.feed(&raw, &mut adapter).unwrap());
        let seen = adapter.into_request();
        assert_eq!(seen.body().read().unwrap().as_ref(), b"streamed payload");

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK")
            .unwrap();
    });

    // A body left open has no declared length yet
    let body = Body::new();
    body.write(b"streamed payload").unwrap();

    let mut conn = connect(addr);
    let request = Request::builder()
        .method(Method::Post)
        .uri("/upload")
        .stream(body)
        .build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.body().read().unwrap().as_ref(), b"OK");

    server.join().unwrap();
}

#[test]
fn test_eof_delimited_response_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        // No framing headers at all: the body runs until close
        stream
            .write_all(b"HTTP/1.0 200 OK\r\n\r\nold-style body")
            .unwrap();
    });

    let mut conn = connect(addr);
    let request = Request::builder().uri("/legacy").build();
    let response = exchange::send(&mut conn, request).unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.body().read().unwrap().as_ref(), b"old-style body");

    server.join().unwrap();
}
