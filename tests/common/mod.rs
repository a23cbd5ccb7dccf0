//! Shared harness: a document root and a server running on an ephemeral
//! port in a background thread.

#![allow(dead_code)]

use minihttpd::dispatch::{Mode, ServerContext};
use minihttpd::signal::Notifier;
use minihttpd::{transport, ServerError};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

pub const HELLO: &[u8] = b"hello, world";

/// Document root with a 12-byte file, a multi-chunk file, a file of exactly
/// one buffer, an index and a subdirectory.
pub fn document_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), HELLO).unwrap();
    std::fs::write(dir.path().join("index.html"), b"<h1>index</h1>").unwrap();
    std::fs::write(dir.path().join("big.bin"), big_body()).unwrap();
    std::fs::write(dir.path().join("exact.bin"), vec![b'e'; 4096]).unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    dir
}

pub fn big_body() -> Vec<u8> {
    (0..10_000u32).map(|i| (i % 251) as u8).collect()
}

pub fn ok_response(body: &[u8]) -> Vec<u8> {
    let mut expected = format!("HTTP/1.0 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    expected.extend_from_slice(body);
    expected
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub ctx: ServerContext,
    handle: JoinHandle<Result<u64, ServerError>>,
}

impl TestServer {
    pub fn start(mode: Mode, workers: usize, root: &Path) -> Self {
        let listener = transport::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ServerContext::new(root, Notifier::new().unwrap());

        let server_ctx = ctx.clone();
        let handle = thread::spawn(move || {
            let mut dispatcher = mode.dispatcher(workers);
            dispatcher.serve(listener, &server_ctx)
        });

        Self { addr, ctx, handle }
    }

    /// Sends `raw` and reads until the server closes the connection.
    pub fn request(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream.write_all(raw).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        response
    }

    pub fn get(&self, resource: &str) -> Vec<u8> {
        self.request(format!("GET {} HTTP/1.0\r\n\r\n", resource).as_bytes())
    }

    /// Requests termination and returns the dispatcher's final count.
    pub fn stop(self) -> u64 {
        self.ctx.notifier.shutdown();
        self.handle.join().unwrap().unwrap()
    }
}

/// The reference exchange set: a small file, a miss, a directory, the
/// index, and files that end exactly on and past a buffer boundary.
/// Returns the expected number of successful operations.
pub fn exercise(server: &TestServer) -> u64 {
    assert_eq!(server.get("/hello.txt"), ok_response(HELLO));
    assert_eq!(server.get("/nope"), b"HTTP/1.0 404 Not Found\r\n\r\n");
    assert_eq!(server.get("/sub"), b"HTTP/1.0 403 Forbidden\r\n\r\n");
    assert_eq!(server.get("/"), ok_response(b"<h1>index</h1>"));
    assert_eq!(server.get("/big.bin"), ok_response(&big_body()));
    assert_eq!(server.get("/exact.bin"), ok_response(&[b'e'; 4096]));
    4
}
