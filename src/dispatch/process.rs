//! Process-per-Connection Dispatcher
//!
//! ```text
//!   parent: wait ──> accept ──> fork ─┬─> drop stream, remember pid ──> wait ...
//!                                     │
//!   child:                            └─> close listener
//!                                         run_to_completion()
//!                                         _exit(outcome code)
//! ```
//!
//! The child's outcome travels back to the parent as its exit status. The
//! parent reaps children when a child-exit notification arrives, counts
//! those that exited with the `Ok` code, and on termination blocks until
//! every remaining child has been reaped.

use super::{accept_blocking, wait_for_activity, Dispatcher, ServerContext};
use crate::connection::Outcome;
use crate::error::ServerError;
use crate::signal::{self, Event};
use std::collections::HashSet;
use std::io;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use tracing::{debug, error, info, warn};

pub struct ProcessDispatcher {
    children: HashSet<libc::pid_t>,
}

impl ProcessDispatcher {
    pub fn new() -> Self {
        Self {
            children: HashSet::new(),
        }
    }

    /// Number of children not yet reaped.
    pub fn live_children(&self) -> usize {
        self.children.len()
    }

    /// Reaps tracked children. With `block`, waits for each of them;
    /// otherwise only collects those that have already exited.
    fn reap(&mut self, ctx: &ServerContext, block: bool) {
        let flags = if block { 0 } else { libc::WNOHANG };
        let pids: Vec<libc::pid_t> = self.children.iter().copied().collect();

        for pid in pids {
            let mut status: libc::c_int = 0;
            let rc = loop {
                let rc = unsafe { libc::waitpid(pid, &mut status, flags) };
                if rc == -1 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break rc;
            };

            match rc {
                0 => {}
                -1 => {
                    // Already gone (ECHILD); nothing left to count.
                    warn!(pid, error = %io::Error::last_os_error(), "Failed to reap child");
                    self.children.remove(&pid);
                    ctx.stats.connection_abandoned();
                }
                _ => {
                    self.children.remove(&pid);
                    let outcome = exit_outcome(status);
                    debug!(pid, ?outcome, "Child reaped");
                    ctx.stats.connection_retired(outcome);
                }
            }
        }
    }
}

impl Default for ProcessDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a child's wait status into the outcome it reported.
fn exit_outcome(status: libc::c_int) -> Outcome {
    if libc::WIFEXITED(status) {
        Outcome::from_code(libc::WEXITSTATUS(status)).unwrap_or(Outcome::Bad)
    } else {
        Outcome::Bad
    }
}

impl Dispatcher for ProcessDispatcher {
    fn name(&self) -> &'static str {
        "fork"
    }

    fn serve(&mut self, listener: TcpListener, ctx: &ServerContext) -> Result<u64, ServerError> {
        listener.set_nonblocking(true).map_err(ServerError::Listener)?;
        info!("Serving with one process per connection");

        let result = loop {
            let activity = match wait_for_activity(&listener, &ctx.notifier) {
                Ok(activity) => activity,
                Err(e) => break Err(e),
            };

            if activity.notification {
                let events = ctx.notifier.drain();
                if events.contains(&Event::ChildExited) {
                    self.reap(ctx, false);
                }
                if events.contains(&Event::Terminate) {
                    info!("Termination requested, no longer accepting");
                    break Ok(());
                }
            }

            // Covers children that exited while no handler was watching.
            if !self.children.is_empty() {
                self.reap(ctx, false);
            }

            if !activity.connection {
                continue;
            }

            let Some((stream, addr)) = accept_blocking(&listener) else {
                continue;
            };
            ctx.stats.connection_opened();

            match unsafe { libc::fork() } {
                -1 => {
                    error!(client = %addr, error = %io::Error::last_os_error(), "fork failed");
                    ctx.stats.connection_abandoned();
                }
                0 => {
                    signal::reset_in_child();
                    unsafe {
                        libc::close(listener.as_raw_fd());
                    }
                    let outcome = ctx.connection(stream, addr).run_to_completion();
                    unsafe { libc::_exit(outcome.code()) }
                }
                pid => {
                    debug!(pid, client = %addr, "Spawned child");
                    drop(stream);
                    self.children.insert(pid);
                }
            }
        };

        if !self.children.is_empty() {
            info!(children = self.children.len(), "Waiting for children to finish");
        }
        self.reap(ctx, true);

        result.map(|()| ctx.stats.operations())
    }
}
