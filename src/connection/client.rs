//! Connection State Machine
//!
//! Every accepted socket becomes a [`Connection`]. The connection owns the
//! socket, one fixed-size buffer and, while a file is being served, the
//! open file handle.
//!
//! ## States
//!
//! ```text
//!               header complete                final chunk drained
//!  Receiving ───────────────────> Sending ──────────────────────> Terminated
//!      │                           │   ▲                              ▲
//!      │ EOF / read error /        │   │ segment drained,             │
//!      │ buffer full               │   │ next chunk loaded            │
//!      │                           └───┘                              │
//!      │                           │ write error                      │
//!      └───────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! A single [`Connection::step`] performs one read attempt while
//! receiving, or one flush-then-reload cycle while sending. On a
//! non-blocking socket a step that cannot make progress returns with the
//! state and write cursor untouched, so the caller can wait for readiness.
//! [`Connection::run_to_completion`] simply steps a blocking socket until
//! the connection terminates.
//!
//! ## Buffer Management
//!
//! The same buffer holds the request while receiving and the current
//! response segment while sending. The first segment is the response
//! header; after that every segment is a chunk of the file. A file read
//! that returns fewer than [`BUFFER_SIZE`] bytes is taken to be the last
//! chunk. That holds for regular files, which are the only resources
//! served.

use crate::connection::ServerStats;
use crate::error::ConnectionError;
use crate::protocol::{
    header_is_complete, parse_request, render_forbidden, render_not_found, render_ok, Request,
};
use bytes::BytesMut;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Size of the per-connection buffer, and of each file chunk
pub const BUFFER_SIZE: usize = 4096;

/// Largest request header accepted (one byte of the buffer is kept spare)
pub const MAX_HEADER_SIZE: usize = BUFFER_SIZE - 1;

/// Resource served when the request names the root (`/`)
pub const INDEX_FILE: &str = "index.html";

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Accumulating the request header
    Receiving,
    /// Writing the response header and body
    Sending,
    /// Transport closed; absorbing
    Terminated,
}

/// How an exchange ended.
///
/// The numeric codes double as child exit statuses in the process
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The requested file was sent in full
    Ok,
    /// Transport failure or malformed request; no (complete) response
    Bad,
    /// A 404 was sent
    NotFound,
    /// A 403 was sent
    Forbidden,
}

impl Outcome {
    /// Exit-status code for this outcome.
    pub fn code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::Bad => 1,
            Outcome::NotFound => 2,
            Outcome::Forbidden => 3,
        }
    }

    /// Inverse of [`Outcome::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Outcome::Ok),
            1 => Some(Outcome::Bad),
            2 => Some(Outcome::NotFound),
            3 => Some(Outcome::Forbidden),
            _ => None,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }
}

/// Progress through the response segment currently in the buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteCursor {
    /// Bytes of the segment already written
    pub written: usize,
    /// Bytes of the segment still to write
    pub remaining: usize,
}

enum Flush {
    Drained,
    Pending,
}

enum Resource {
    Missing,
    Unreadable,
    File(File, u64),
}

/// One client connection and its exchange state.
pub struct Connection<S> {
    /// The transport; `None` once terminated
    transport: Option<S>,

    /// Client's address (for logging)
    peer: Option<SocketAddr>,

    /// Directory resources are resolved against
    root: Arc<Path>,

    /// Request bytes while receiving, current segment while sending
    buffer: BytesMut,

    /// Request bytes accumulated so far
    bytes_read: usize,

    cursor: WriteCursor,

    /// File being streamed; only set while sending a 200 body
    file: Option<File>,

    /// Set once the short (last) chunk of the file is in the buffer
    final_segment: bool,

    state: State,
    outcome: Outcome,

    /// Server statistics (shared)
    stats: Arc<ServerStats>,
}

impl<S: Read + Write> Connection<S> {
    /// Creates a connection in state `Receiving` with an implicit `Ok`
    /// outcome.
    ///
    /// # Arguments
    ///
    /// * `transport` - The socket (or any byte stream) for this client
    /// * `root` - Directory that request paths are resolved against
    /// * `stats` - Shared server statistics
    pub fn new(transport: S, root: Arc<Path>, stats: Arc<ServerStats>) -> Self {
        Self {
            transport: Some(transport),
            peer: None,
            root,
            buffer: BytesMut::zeroed(BUFFER_SIZE),
            bytes_read: 0,
            cursor: WriteCursor::default(),
            file: None,
            final_segment: false,
            state: State::Receiving,
            outcome: Outcome::Ok,
            stats,
        }
    }

    /// Attaches the peer address used in log lines.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn cursor(&self) -> WriteCursor {
        self.cursor
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_terminated(&self) -> bool {
        self.state == State::Terminated
    }

    /// True while a file handle is held open.
    pub fn has_resource(&self) -> bool {
        self.file.is_some()
    }

    /// The transport, until the connection terminates.
    pub fn transport(&self) -> Option<&S> {
        self.transport.as_ref()
    }

    /// Advances the state machine by one bounded unit of work and returns
    /// the resulting state.
    pub fn step(&mut self) -> State {
        let result = match self.state {
            State::Receiving => self.receive(),
            State::Sending => self.send(),
            State::Terminated => return State::Terminated,
        };

        if let Err(err) = result {
            self.fail(err);
        }

        self.state
    }

    /// Drives the connection to `Terminated` and returns its outcome.
    ///
    /// The transport must be in blocking mode; on a non-blocking transport
    /// this would spin.
    pub fn run_to_completion(mut self) -> Outcome {
        while self.step() != State::Terminated {}
        self.outcome
    }

    /// Closes the connection without finishing the exchange.
    ///
    /// Used when the server shuts down with connections still registered.
    pub fn close(&mut self) {
        if self.state != State::Terminated {
            debug!(client = ?self.peer, state = ?self.state, "Closing connection at shutdown");
            self.finish();
        }
    }

    /// One read attempt.
    fn receive(&mut self) -> Result<(), ConnectionError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        let n = match transport.read(&mut self.buffer[self.bytes_read..MAX_HEADER_SIZE]) {
            Ok(0) => return Err(ConnectionError::IncompleteHeader),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                return Ok(())
            }
            Err(e) => return Err(ConnectionError::Read(e)),
        };

        self.bytes_read += n;
        self.stats.bytes_read(n);
        trace!(client = ?self.peer, bytes = n, total = self.bytes_read, "Read data");

        let received = &self.buffer[..self.bytes_read];
        if header_is_complete(received) {
            let request = parse_request(received)?;
            debug!(
                client = ?self.peer,
                resource = %request.resource,
                protocol = %request.protocol,
                "Request received"
            );
            self.prepare_response(&request);
            return Ok(());
        }

        if self.bytes_read >= MAX_HEADER_SIZE {
            return Err(ConnectionError::HeaderTooLarge {
                max: MAX_HEADER_SIZE,
            });
        }

        Ok(())
    }

    /// Resolves the resource, loads the response header as the first
    /// segment and switches to `Sending`.
    fn prepare_response(&mut self, request: &Request) {
        let resource = match resolve(&self.root, &request.resource) {
            Some(path) => open_resource(&path),
            None => {
                debug!(client = ?self.peer, resource = %request.resource, "Resource outside document root");
                Resource::Missing
            }
        };

        let header = match resource {
            Resource::Missing => {
                self.record_outcome(Outcome::NotFound);
                render_not_found(&request.protocol)
            }
            Resource::Unreadable => {
                self.record_outcome(Outcome::Forbidden);
                render_forbidden(&request.protocol)
            }
            Resource::File(file, len) => {
                self.file = Some(file);
                render_ok(&request.protocol, len)
            }
        };

        debug_assert!(header.len() <= BUFFER_SIZE);
        self.buffer[..header.len()].copy_from_slice(&header);
        self.cursor = WriteCursor {
            written: 0,
            remaining: header.len(),
        };
        self.state = State::Sending;
    }

    /// One flush-then-reload cycle.
    fn send(&mut self) -> Result<(), ConnectionError> {
        if let Flush::Pending = self.flush()? {
            return Ok(());
        }

        if self.final_segment || self.file.is_none() {
            debug!(client = ?self.peer, outcome = ?self.outcome, "Response sent");
            self.finish();
            return Ok(());
        }

        self.load_next_chunk()
    }

    /// Writes the pending segment from the cursor until it drains, an error
    /// occurs, or the transport would block.
    fn flush(&mut self) -> Result<Flush, ConnectionError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(Flush::Drained);
        };

        while self.cursor.remaining > 0 {
            let start = self.cursor.written;
            let end = start + self.cursor.remaining;

            match transport.write(&self.buffer[start..end]) {
                Ok(0) => return Err(ConnectionError::Write(io::Error::from(ErrorKind::WriteZero))),
                Ok(n) => {
                    self.cursor.written += n;
                    self.cursor.remaining -= n;
                    self.stats.bytes_written(n);
                    trace!(client = ?self.peer, bytes = n, remaining = self.cursor.remaining, "Wrote data");
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Flush::Pending),
                Err(e) => return Err(ConnectionError::Write(e)),
            }
        }

        Ok(Flush::Drained)
    }

    /// Reads the next file chunk into the buffer and resets the cursor.
    fn load_next_chunk(&mut self) -> Result<(), ConnectionError> {
        let Some(file) = self.file.as_mut() else {
            self.finish();
            return Ok(());
        };

        let n = read_chunk(file, &mut self.buffer[..BUFFER_SIZE])
            .map_err(ConnectionError::ResourceRead)?;

        if n < BUFFER_SIZE {
            self.file = None;
            self.final_segment = true;
        }

        if n == 0 {
            debug!(client = ?self.peer, outcome = ?self.outcome, "Response sent");
            self.finish();
            return Ok(());
        }

        self.cursor = WriteCursor {
            written: 0,
            remaining: n,
        };
        Ok(())
    }

    fn fail(&mut self, err: ConnectionError) {
        debug!(client = ?self.peer, state = ?self.state, error = %err, "Connection failed");
        self.outcome = Outcome::Bad;
        self.finish();
    }

    /// A transport failure overrides everything; otherwise the first
    /// recorded outcome sticks.
    fn record_outcome(&mut self, outcome: Outcome) {
        if self.outcome == Outcome::Ok {
            self.outcome = outcome;
        }
    }

    /// Enters `Terminated`, closing the transport and any open file.
    fn finish(&mut self) {
        self.state = State::Terminated;
        self.file = None;
        self.transport = None;
    }
}

/// Maps a request resource onto a path under `root`.
///
/// Returns `None` for resources that would leave `root` (`..` segments).
fn resolve(root: &Path, resource: &str) -> Option<PathBuf> {
    let relative = Path::new(resource.trim_start_matches('/'));
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return None;
    }

    if relative.as_os_str().is_empty() {
        Some(root.join(INDEX_FILE))
    } else {
        Some(root.join(relative))
    }
}

fn open_resource(path: &Path) -> Resource {
    match fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return Resource::Unreadable,
        Err(_) => return Resource::Missing,
        Ok(meta) if !meta.is_file() => return Resource::Unreadable,
        Ok(_) => {}
    }

    match File::open(path).and_then(|file| file.metadata().map(|meta| (file, meta.len()))) {
        Ok((file, len)) => Resource::File(file, len),
        Err(_) => Resource::Unreadable,
    }
}

fn read_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    /// In-memory transport: reads come from `input` in chunks of at most
    /// `read_chunk` bytes, writes are accepted `write_chunk` bytes at a time.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        read_chunk: usize,
        output: Vec<u8>,
        write_chunk: usize,
        /// Number of writes to refuse with `WouldBlock` before accepting
        write_blocks: usize,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl MockStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                read_chunk: usize::MAX,
                output: Vec::new(),
                write_chunk: usize::MAX,
                write_blocks: 0,
                fail_writes: false,
                fail_reads: false,
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_reads {
                return Err(io::Error::from(ErrorKind::ConnectionReset));
            }
            let len = buf.len().min(self.read_chunk);
            self.input.read(&mut buf[..len])
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::from(ErrorKind::BrokenPipe));
            }
            if self.write_blocks > 0 {
                self.write_blocks -= 1;
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            let len = buf.len().min(self.write_chunk);
            self.output.extend_from_slice(&buf[..len]);
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A transport that hands its output back after the connection drops it.
    struct Shared(Arc<std::sync::Mutex<MockStream>>);

    impl Read for Shared {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.lock().unwrap().read(buf)
        }
    }

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn docroot() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), b"hello world\n").unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        dir
    }

    fn connection(
        dir: &tempfile::TempDir,
        stream: MockStream,
    ) -> (Connection<Shared>, Arc<std::sync::Mutex<MockStream>>) {
        let shared = Arc::new(std::sync::Mutex::new(stream));
        let root: Arc<Path> = Arc::from(dir.path());
        let conn = Connection::new(
            Shared(Arc::clone(&shared)),
            root,
            Arc::new(ServerStats::new()),
        );
        (conn, shared)
    }

    fn output(shared: &Arc<std::sync::Mutex<MockStream>>) -> Vec<u8> {
        shared.lock().unwrap().output.clone()
    }

    #[test]
    fn test_outcome_codes_round_trip() {
        for outcome in [Outcome::Ok, Outcome::Bad, Outcome::NotFound, Outcome::Forbidden] {
            assert_eq!(Outcome::from_code(outcome.code()), Some(outcome));
        }
        assert_eq!(Outcome::from_code(42), None);
    }

    #[test]
    fn test_initial_state() {
        let dir = docroot();
        let (conn, _) = connection(&dir, MockStream::new(b""));
        assert_eq!(conn.state(), State::Receiving);
        assert_eq!(conn.outcome(), Outcome::Ok);
        assert_eq!(conn.bytes_read(), 0);
        assert!(!conn.has_resource());
    }

    #[test]
    fn test_serves_file() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b"GET /hello.txt HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        assert_eq!(
            output(&shared),
            b"HTTP/1.0 200 OK\r\nContent-Length: 12\r\n\r\nhello world\n"
        );
    }

    #[test]
    fn test_receiving_to_sending_transition() {
        let dir = docroot();
        let (mut conn, _) = connection(&dir, MockStream::new(b"GET /hello.txt HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.step(), State::Sending);
        assert!(conn.has_resource());
        let header = b"HTTP/1.0 200 OK\r\nContent-Length: 12\r\n\r\n";
        assert_eq!(
            conn.cursor(),
            WriteCursor {
                written: 0,
                remaining: header.len()
            }
        );
    }

    #[test]
    fn test_header_split_across_reads() {
        let dir = docroot();
        let mut stream = MockStream::new(b"GET /hello.txt HTTP/1.0\r\n\r\n");
        stream.read_chunk = 5;
        let (mut conn, _) = connection(&dir, stream);

        let mut steps = 0;
        while conn.step() == State::Receiving {
            steps += 1;
        }
        assert!(steps >= 5);
        assert_eq!(conn.state(), State::Sending);
        assert_eq!(conn.bytes_read(), 27);
    }

    #[test]
    fn test_not_found_has_no_body() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b"GET /nope HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::NotFound);
        assert_eq!(output(&shared), b"HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[test]
    fn test_directory_is_forbidden() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b"GET /subdir HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::Forbidden);
        assert_eq!(output(&shared), b"HTTP/1.0 403 Forbidden\r\n\r\n");
    }

    #[test]
    fn test_root_serves_index() {
        let dir = docroot();
        fs::write(dir.path().join(INDEX_FILE), b"<h1>hi</h1>").unwrap();
        let (conn, shared) = connection(&dir, MockStream::new(b"GET / HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        assert!(output(&shared).ends_with(b"<h1>hi</h1>"));
    }

    #[test]
    fn test_empty_file() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b"GET /empty.txt HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        assert_eq!(output(&shared), b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn test_exact_multiple_of_chunk_size() {
        let dir = docroot();
        let body: Vec<u8> = (0..BUFFER_SIZE * 2).map(|i| (i % 251) as u8).collect();
        fs::write(dir.path().join("two_chunks.bin"), &body).unwrap();
        let (conn, shared) =
            connection(&dir, MockStream::new(b"GET /two_chunks.bin HTTP/1.0\r\n\r\n"));

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        let out = output(&shared);
        assert!(out.ends_with(&body));
        assert!(out.starts_with(format!("HTTP/1.0 200 OK\r\nContent-Length: {}\r\n", body.len()).as_bytes()));
    }

    #[test]
    fn test_large_file_with_short_writes() {
        let dir = docroot();
        let body: Vec<u8> = (0..BUFFER_SIZE * 3 + 17).map(|i| (i % 13) as u8).collect();
        fs::write(dir.path().join("big.bin"), &body).unwrap();
        let mut stream = MockStream::new(b"GET /big.bin HTTP/1.0\r\n\r\n");
        stream.write_chunk = 1000;
        let (conn, shared) = connection(&dir, stream);

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        let out = output(&shared);
        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&out[split..], &body[..]);
    }

    #[test]
    fn test_would_block_leaves_cursor_unchanged() {
        let dir = docroot();
        let mut stream = MockStream::new(b"GET /hello.txt HTTP/1.0\r\n\r\n");
        stream.write_blocks = 1;
        let (mut conn, shared) = connection(&dir, stream);

        assert_eq!(conn.step(), State::Sending);
        let before = conn.cursor();

        assert_eq!(conn.step(), State::Sending);
        assert_eq!(conn.cursor(), before);
        assert!(output(&shared).is_empty());

        while conn.step() != State::Terminated {}
        assert_eq!(conn.outcome(), Outcome::Ok);
        assert!(output(&shared).ends_with(b"hello world\n"));
    }

    #[test]
    fn test_eof_before_header_is_bad() {
        let dir = docroot();
        let (mut conn, _) = connection(&dir, MockStream::new(b"GET /hello.txt HTTP/1.0\r\n"));

        assert_eq!(conn.step(), State::Receiving);
        assert_eq!(conn.step(), State::Terminated);
        assert_eq!(conn.outcome(), Outcome::Bad);
        assert!(conn.transport().is_none());
    }

    #[test]
    fn test_immediate_close_is_bad() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b""));
        assert_eq!(conn.run_to_completion(), Outcome::Bad);
        assert!(output(&shared).is_empty());
    }

    #[test]
    fn test_read_error_is_bad() {
        let dir = docroot();
        let mut stream = MockStream::new(b"GET / HTTP/1.0\r\n\r\n");
        stream.fail_reads = true;
        let (conn, _) = connection(&dir, stream);
        assert_eq!(conn.run_to_completion(), Outcome::Bad);
    }

    #[test]
    fn test_header_too_large_is_bad() {
        let dir = docroot();
        let mut request = b"GET /hello.txt HTTP/1.0\r\n".to_vec();
        request.extend(std::iter::repeat(b'x').take(BUFFER_SIZE * 2));
        let (conn, shared) = connection(&dir, MockStream::new(&request));

        assert_eq!(conn.run_to_completion(), Outcome::Bad);
        assert!(output(&shared).is_empty());
    }

    #[test]
    fn test_malformed_request_is_bad() {
        let dir = docroot();
        let (conn, shared) = connection(&dir, MockStream::new(b"BREW /pot HTCPCP/1.0\r\n\r\n"));
        assert_eq!(conn.run_to_completion(), Outcome::Bad);
        assert!(output(&shared).is_empty());
    }

    #[test]
    fn test_write_error_releases_file() {
        let dir = docroot();
        let mut stream = MockStream::new(b"GET /hello.txt HTTP/1.0\r\n\r\n");
        stream.fail_writes = true;
        let (mut conn, _) = connection(&dir, stream);

        assert_eq!(conn.step(), State::Sending);
        assert!(conn.has_resource());
        assert_eq!(conn.step(), State::Terminated);
        assert_eq!(conn.outcome(), Outcome::Bad);
        assert!(!conn.has_resource());
    }

    #[test]
    fn test_write_error_overrides_not_found() {
        let dir = docroot();
        let mut stream = MockStream::new(b"GET /nope HTTP/1.0\r\n\r\n");
        stream.fail_writes = true;
        let (conn, _) = connection(&dir, stream);
        assert_eq!(conn.run_to_completion(), Outcome::Bad);
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let dir = docroot();
        let (mut conn, _) = connection(&dir, MockStream::new(b""));
        assert_eq!(conn.step(), State::Terminated);
        assert_eq!(conn.step(), State::Terminated);
        assert_eq!(conn.outcome(), Outcome::Bad);
    }

    #[test]
    fn test_close_while_receiving() {
        let dir = docroot();
        let (mut conn, _) = connection(&dir, MockStream::new(b"GET"));
        conn.close();
        assert!(conn.is_terminated());
        assert!(conn.transport().is_none());
    }

    #[test]
    fn test_byte_counters() {
        let dir = docroot();
        let shared = Arc::new(std::sync::Mutex::new(MockStream::new(
            b"GET /hello.txt HTTP/1.0\r\n\r\n",
        )));
        let stats = Arc::new(ServerStats::new());
        let conn = Connection::new(
            Shared(Arc::clone(&shared)),
            Arc::from(dir.path()),
            Arc::clone(&stats),
        );

        assert_eq!(conn.run_to_completion(), Outcome::Ok);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 27);
        assert_eq!(
            stats.bytes_written.load(Ordering::Relaxed),
            output(&shared).len() as u64
        );
    }

    #[test]
    fn test_resolve() {
        let root = Path::new("/srv");
        assert_eq!(resolve(root, "/a/b.txt"), Some(PathBuf::from("/srv/a/b.txt")));
        assert_eq!(resolve(root, "/"), Some(PathBuf::from("/srv/index.html")));
        assert_eq!(resolve(root, "c"), Some(PathBuf::from("/srv/c")));
        assert_eq!(resolve(root, "//a"), Some(PathBuf::from("/srv/a")));
    }

    #[test]
    fn test_resolve_rejects_parent_segments() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve(root, "/../secret.txt"), None);
        assert_eq!(resolve(root, "/a/../../etc/passwd"), None);
        assert_eq!(resolve(root, ".."), None);
    }

    #[test]
    fn test_parent_traversal_is_not_found() {
        let outer = tempfile::tempdir().unwrap();
        let www = outer.path().join("www");
        fs::create_dir(&www).unwrap();
        fs::write(outer.path().join("secret.txt"), b"TOPSECRET").unwrap();

        let shared = Arc::new(std::sync::Mutex::new(MockStream::new(
            b"GET /../secret.txt HTTP/1.0\r\n\r\n",
        )));
        let conn = Connection::new(
            Shared(Arc::clone(&shared)),
            Arc::from(www.as_path()),
            Arc::new(ServerStats::new()),
        );

        assert_eq!(conn.run_to_completion(), Outcome::NotFound);
        assert_eq!(output(&shared), b"HTTP/1.0 404 Not Found\r\n\r\n");
    }

    #[test]
    fn test_unopenable_file_is_forbidden() {
        // Permission bits do not restrict root
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        use std::os::unix::fs::PermissionsExt;

        let dir = docroot();
        let locked = dir.path().join("locked.txt");
        fs::write(&locked, b"no peeking").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (conn, shared) = connection(&dir, MockStream::new(b"GET /locked.txt HTTP/1.0\r\n\r\n"));
        assert_eq!(conn.run_to_completion(), Outcome::Forbidden);
        assert_eq!(output(&shared), b"HTTP/1.0 403 Forbidden\r\n\r\n");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
