//! Worker-Pool Dispatcher
//!
//! The caller's thread accepts; a fixed set of worker threads serves.
//!
//! ```text
//!   accept loop ──push──> ┌──────────────────────┐ ──pop──> worker-0
//!                         │  RequestQueue (FIFO) │ ──pop──> worker-1
//!                         └──────────────────────┘ ──pop──> worker-N
//! ```
//!
//! Each worker drives one connection at a time to completion with blocking
//! I/O, so at most `workers` exchanges are in flight. On termination the
//! queue is shut down, every connection already queued is still served,
//! and the workers are joined.

use super::queue::RequestQueue;
use super::{accept_blocking, wait_for_activity, Dispatcher, ServerContext};
use crate::connection::{Connection, ServerStats};
use crate::error::ServerError;
use crate::signal::Event;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// A running set of worker threads consuming a shared queue.
pub struct WorkerPool<S = TcpStream> {
    queue: Arc<RequestQueue<Connection<S>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<S> WorkerPool<S>
where
    S: Read + Write + Send + 'static,
{
    /// Starts `size` workers named `worker-{i}`.
    ///
    /// If any thread fails to start, the ones already running are stopped
    /// and joined before the error is returned.
    pub fn spawn(
        size: usize,
        queue: Arc<RequestQueue<Connection<S>>>,
        stats: Arc<ServerStats>,
    ) -> Result<Self, ServerError> {
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let queue_handle = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || worker_loop(&queue_handle, &stats));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    queue.shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(ServerError::SpawnWorker { index, source });
                }
            }
        }

        debug!(workers = size, "Worker pool started");
        Ok(Self { queue, workers })
    }

    /// Hands a connection to the next idle worker.
    ///
    /// Returns the connection back if the pool is shutting down.
    pub fn submit(&self, connection: Connection<S>) -> Result<(), Connection<S>> {
        self.queue.push(connection)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Connections waiting for a worker.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Stops accepting work, lets the workers drain the queue, and joins
    /// them.
    pub fn shutdown(self) {
        self.queue.shutdown();
        for handle in self.workers {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

fn worker_loop<S: Read + Write>(queue: &RequestQueue<Connection<S>>, stats: &ServerStats) {
    while let Some(connection) = queue.pop() {
        let peer = connection.peer();
        let outcome = connection.run_to_completion();
        stats.connection_retired(outcome);
        debug!(client = ?peer, ?outcome, "Connection served");
    }
}

/// Accept loop feeding a [`WorkerPool`].
pub struct PoolDispatcher {
    workers: usize,
}

impl PoolDispatcher {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }
}

impl Dispatcher for PoolDispatcher {
    fn name(&self) -> &'static str {
        "pool"
    }

    fn serve(&mut self, listener: TcpListener, ctx: &ServerContext) -> Result<u64, ServerError> {
        listener.set_nonblocking(true).map_err(ServerError::Listener)?;

        let queue = Arc::new(RequestQueue::new());
        let pool = WorkerPool::spawn(self.workers, queue, Arc::clone(&ctx.stats))?;
        info!(workers = pool.size(), "Serving with worker pool");

        let result = accept_loop(&listener, ctx, &pool);

        // Queued connections are still served before the workers exit.
        debug!(backlog = pool.backlog(), "Draining worker pool");
        pool.shutdown();

        result.map(|()| ctx.stats.operations())
    }
}

fn accept_loop(
    listener: &TcpListener,
    ctx: &ServerContext,
    pool: &WorkerPool,
) -> Result<(), ServerError> {
    loop {
        let activity = wait_for_activity(listener, &ctx.notifier)?;

        if activity.notification && ctx.notifier.drain().contains(&Event::Terminate) {
            info!("Termination requested, no longer accepting");
            return Ok(());
        }

        if !activity.connection {
            continue;
        }

        let Some((stream, addr)) = accept_blocking(listener) else {
            continue;
        };

        ctx.stats.connection_opened();
        if pool.submit(ctx.connection(stream, addr)).is_err() {
            warn!(client = %addr, "Pool is shutting down, dropping connection");
            ctx.stats.connection_abandoned();
        }
    }
}
