//! Single-Threaded Event Loop
//!
//! One thread multiplexes every connection with `select(2)`:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ build sets: listener + notifier + Receiving   -> read set    │
//!   │                                   Sending     -> write set   │
//!   │ select()                                                     │
//!   │ notifier ready?  drain, stop on Terminate                    │
//!   │ listener ready?  accept all pending, register as Receiving   │
//!   │ step() each connection flagged ready                         │
//!   │ sweep Terminated connections, retire them                    │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transports are non-blocking, so a step never stalls the loop. A
//! connection is only stepped when its descriptor was flagged in the set
//! matching its state.

use super::{Dispatcher, ServerContext};
use crate::connection::{Connection, State};
use crate::error::ServerError;
use crate::signal::Event;
use crate::transport;
use std::collections::HashMap;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, info, warn};

/// Highest descriptor `select(2)` can watch, exclusive.
const MAX_SELECT_FD: RawFd = libc::FD_SETSIZE as RawFd;

/// Safe wrapper over `libc::fd_set`.
pub struct FdSet {
    raw: libc::fd_set,
    max_fd: RawFd,
}

impl FdSet {
    pub fn new() -> Self {
        let mut raw = std::mem::MaybeUninit::<libc::fd_set>::uninit();
        unsafe {
            libc::FD_ZERO(raw.as_mut_ptr());
            Self {
                raw: raw.assume_init(),
                max_fd: -1,
            }
        }
    }

    /// Adds `fd`. Returns false, leaving the set unchanged, if `fd` is
    /// outside the range `select(2)` supports.
    pub fn insert(&mut self, fd: RawFd) -> bool {
        if !(0..MAX_SELECT_FD).contains(&fd) {
            return false;
        }
        unsafe { libc::FD_SET(fd, &mut self.raw) };
        self.max_fd = self.max_fd.max(fd);
        true
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        (0..MAX_SELECT_FD).contains(&fd) && unsafe { libc::FD_ISSET(fd, &self.raw) }
    }

    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks in `select(2)` until a descriptor in either set is ready. On
/// return the sets hold only the ready descriptors.
fn select(read: &mut FdSet, write: &mut FdSet) -> io::Result<usize> {
    let nfds = read.max_fd.max(write.max_fd) + 1;
    let rc = unsafe {
        libc::select(
            nfds,
            &mut read.raw,
            &mut write.raw,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

/// Whether a connection in `state` on `fd` may make progress.
pub(crate) fn ready_for(state: State, fd: RawFd, read: &FdSet, write: &FdSet) -> bool {
    match state {
        State::Receiving => read.contains(fd),
        State::Sending => write.contains(fd),
        State::Terminated => false,
    }
}

pub struct EventLoopDispatcher {
    registry: HashMap<RawFd, Connection<TcpStream>>,
}

impl EventLoopDispatcher {
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    /// Connections currently registered.
    pub fn registered(&self) -> usize {
        self.registry.len()
    }

    /// Accepts every pending connection.
    fn accept_pending(&mut self, listener: &TcpListener, ctx: &ServerContext) {
        loop {
            let (stream, addr) = match transport::accept(listener) {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if transport::is_transient(&e) => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    return;
                }
            };

            let fd = stream.as_raw_fd();
            if fd >= MAX_SELECT_FD {
                warn!(client = %addr, fd, "Descriptor beyond select limit, refusing connection");
                continue;
            }
            if let Err(e) = transport::set_nonblocking(&stream, true) {
                warn!(client = %addr, error = %e, "Failed to configure connection");
                continue;
            }

            let (host, port) = transport::peer_info(&addr);
            info!(%host, port, "New connection");

            ctx.stats.connection_opened();
            self.registry.insert(fd, ctx.connection(stream, addr));
        }
    }

    /// Removes terminated connections and counts their outcomes.
    fn sweep(&mut self, ctx: &ServerContext) {
        self.registry.retain(|fd, connection| {
            if !connection.is_terminated() {
                return true;
            }
            let outcome = connection.outcome();
            debug!(fd, ?outcome, "Connection retired");
            ctx.stats.connection_retired(outcome);
            false
        });
    }

    /// One pass: wait, then act on whatever became ready.
    ///
    /// Returns `Ok(false)` once termination has been requested.
    fn turn(&mut self, listener: &TcpListener, ctx: &ServerContext) -> Result<bool, ServerError> {
        let listener_fd = listener.as_raw_fd();
        let notifier_fd = ctx.notifier.as_raw_fd();

        let mut read = FdSet::new();
        let mut write = FdSet::new();
        read.insert(listener_fd);
        read.insert(notifier_fd);
        for (&fd, connection) in &self.registry {
            match connection.state() {
                State::Receiving => read.insert(fd),
                State::Sending => write.insert(fd),
                State::Terminated => false,
            };
        }

        match select(&mut read, &mut write) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(true),
            Err(e) => return Err(ServerError::Poll(e)),
        }

        if read.contains(notifier_fd) && ctx.notifier.drain().contains(&Event::Terminate) {
            return Ok(false);
        }

        if read.contains(listener_fd) {
            self.accept_pending(listener, ctx);
        }

        for (&fd, connection) in self.registry.iter_mut() {
            if ready_for(connection.state(), fd, &read, &write) {
                connection.step();
            }
        }

        self.sweep(ctx);
        Ok(true)
    }

    /// Force-closes every registered connection. None of them count.
    fn close_all(&mut self, ctx: &ServerContext) {
        if !self.registry.is_empty() {
            info!(connections = self.registry.len(), "Closing open connections");
        }
        for (_, mut connection) in self.registry.drain() {
            connection.close();
            ctx.stats.connection_abandoned();
        }
    }
}

impl Default for EventLoopDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for EventLoopDispatcher {
    fn name(&self) -> &'static str {
        "select"
    }

    fn serve(&mut self, listener: TcpListener, ctx: &ServerContext) -> Result<u64, ServerError> {
        listener.set_nonblocking(true).map_err(ServerError::Listener)?;
        info!("Serving with select event loop");

        let result = loop {
            match self.turn(&listener, ctx) {
                Ok(true) => continue,
                Ok(false) => {
                    info!("Termination requested, no longer accepting");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.close_all(ctx);
        result.map(|()| ctx.stats.operations())
    }
}
