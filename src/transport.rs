//! Transport Helpers
//!
//! Thin wrappers around listening-socket setup and accept, plus the
//! `poll(2)`-based readiness wait used by the blocking dispatchers.
//!
//! `std::net` retries `EINTR` internally for most calls, but `poll(2)` is
//! called directly so that signal delivery surfaces as
//! [`io::ErrorKind::Interrupted`]. Callers treat that as "look at your
//! flags and try again".

use crate::error::ServerError;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::RawFd;

/// Binds the listening socket.
pub fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr).map_err(|source| ServerError::Bind { addr, source })
}

/// Accepts the next connection on `listener`.
pub fn accept(listener: &TcpListener) -> io::Result<(TcpStream, SocketAddr)> {
    listener.accept()
}

/// Splits a peer address into host and port, for logging.
pub fn peer_info(addr: &SocketAddr) -> (String, u16) {
    (addr.ip().to_string(), addr.port())
}

/// Switches a stream between blocking and non-blocking mode.
pub fn set_nonblocking(stream: &TcpStream, nonblocking: bool) -> io::Result<()> {
    stream.set_nonblocking(nonblocking)
}

/// Returns true for accept errors that only mean "nothing to accept right
/// now" and should be retried silently.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
    )
}

/// Blocks until at least one of `fds` is readable, with no timeout.
///
/// Returns one flag per descriptor, in order. Hang-ups and errors count as
/// readable so the caller's next read observes them.
pub fn wait_readable(fds: &[RawFd]) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}
