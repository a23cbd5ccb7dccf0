//! Server Statistics
//!
//! Process-wide counters shared by whichever dispatcher is running. The one
//! that matters to the operator is `operations_completed`: the number of
//! exchanges that finished with outcome `Ok`. It is bumped exactly once per
//! retired connection, by the dispatcher that retires it.

use crate::connection::Outcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Connections accepted but not yet retired
    pub active_connections: AtomicU64,
    /// Exchanges that terminated with outcome `Ok`
    pub operations_completed: AtomicU64,
    /// Total request bytes read
    pub bytes_read: AtomicU64,
    /// Total response bytes written
    pub bytes_written: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Retires a connection, counting it as an operation iff `outcome` is `Ok`.
    pub fn connection_retired(&self, outcome: Outcome) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        if outcome.is_ok() {
            self.operations_completed.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Retires a connection that was closed without finishing its exchange.
    pub fn connection_abandoned(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn operations(&self) -> u64 {
        self.operations_completed.load(Ordering::Acquire)
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}
