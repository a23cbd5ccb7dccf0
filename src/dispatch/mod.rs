//! Dispatchers
//!
//! A dispatcher owns the accept loop and decides how the accepted
//! [`Connection`]s are driven to completion. Three interchangeable
//! strategies are provided, all built on the same connection contract:
//!
//! | Mode | Type | Scheduling |
//! |---|---|---|
//! | `fork` | [`ProcessDispatcher`] | one child process per connection |
//! | `select` | [`EventLoopDispatcher`] | one thread, `select(2)`, non-blocking steps |
//! | `pool` | [`PoolDispatcher`] | fixed worker threads fed by a FIFO queue |
//!
//! Every dispatcher stops accepting once the [`Notifier`] reports
//! termination, and returns the number of exchanges that completed with
//! outcome `Ok`.

pub mod event_loop;
pub mod pool;
pub mod process;
pub mod queue;

pub use event_loop::EventLoopDispatcher;
pub use pool::{PoolDispatcher, WorkerPool};
pub use process::ProcessDispatcher;
pub use queue::RequestQueue;

use crate::connection::{Connection, ServerStats};
use crate::error::ServerError;
use crate::signal::Notifier;
use crate::transport;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by the accept loop and everything it hands work to.
#[derive(Clone)]
pub struct ServerContext {
    /// Directory resources are served from
    pub root: Arc<Path>,
    /// Counters, including the operation count reported at shutdown
    pub stats: Arc<ServerStats>,
    /// Termination and child-exit notifications
    pub notifier: Notifier,
}

impl ServerContext {
    pub fn new(root: impl AsRef<Path>, notifier: Notifier) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
            stats: Arc::new(ServerStats::new()),
            notifier,
        }
    }

    /// Wraps an accepted stream in a fresh connection.
    pub fn connection(&self, stream: TcpStream, peer: SocketAddr) -> Connection<TcpStream> {
        Connection::new(stream, Arc::clone(&self.root), Arc::clone(&self.stats)).with_peer(peer)
    }
}

/// A strategy for driving connections concurrently.
pub trait Dispatcher {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Runs the accept loop on `listener` until termination is requested.
    ///
    /// Returns the cumulative number of successful operations.
    fn serve(&mut self, listener: TcpListener, ctx: &ServerContext) -> Result<u64, ServerError>;
}

/// Dispatch strategy, selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// One process per connection
    Fork,
    /// Single-threaded event loop
    Select,
    /// Fixed-size worker-thread pool
    Pool,
}

impl Mode {
    /// Builds the dispatcher for this mode. `workers` only matters for
    /// [`Mode::Pool`].
    pub fn dispatcher(self, workers: usize) -> Box<dyn Dispatcher> {
        match self {
            Mode::Fork => Box::new(ProcessDispatcher::new()),
            Mode::Select => Box::new(EventLoopDispatcher::new()),
            Mode::Pool => Box::new(PoolDispatcher::new(workers)),
        }
    }
}

/// What woke the accept loop.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Activity {
    pub connection: bool,
    pub notification: bool,
}

/// Blocks until the listener has a pending connection or a notification
/// arrives. An interrupted wait reports no activity so the caller loops.
pub(crate) fn wait_for_activity(
    listener: &TcpListener,
    notifier: &Notifier,
) -> Result<Activity, ServerError> {
    match transport::wait_readable(&[listener.as_raw_fd(), notifier.as_raw_fd()]) {
        Ok(ready) => Ok(Activity {
            connection: ready[0],
            notification: ready[1],
        }),
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(Activity::default()),
        Err(e) => Err(ServerError::Poll(e)),
    }
}

/// Accepts one connection for a blocking dispatcher.
///
/// The listener is non-blocking; the returned stream is switched to
/// blocking mode. Transient failures yield `None`.
pub(crate) fn accept_blocking(listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
    let (stream, addr) = match transport::accept(listener) {
        Ok(accepted) => accepted,
        Err(e) if transport::is_transient(&e) => return None,
        Err(e) => {
            warn!(error = %e, "Failed to accept connection");
            return None;
        }
    };

    if let Err(e) = transport::set_nonblocking(&stream, false) {
        warn!(client = %addr, error = %e, "Failed to configure connection");
        return None;
    }

    let (host, port) = transport::peer_info(&addr);
    info!(%host, port, "New connection");
    Some((stream, addr))
}
