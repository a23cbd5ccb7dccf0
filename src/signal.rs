//! Asynchronous Notifications
//!
//! Signals arrive at arbitrary points, so the handlers here do as little as
//! possible: they set a pending flag and write one byte to a self-pipe.
//! The dispatcher includes the pipe's read end in its readiness wait, wakes
//! up, and calls [`Notifier::drain`] at a point where it is safe to touch
//! shared state (reap children, update counters, stop accepting).
//!
//! ```text
//!   SIGTERM / SIGINT ──┐
//!                      ├──> flag + write(pipe, 1 byte)
//!   SIGCHLD ───────────┘                │
//!                                       ▼
//!              dispatcher loop: poll/select wakes ──> drain() ──> [Event]
//! ```
//!
//! [`Notifier::shutdown`] requests termination from ordinary code (and from
//! tests) through the same path, without a signal.

use crate::error::ServerError;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Write end of the installed notifier, or -1
static SIGNAL_PIPE: AtomicI32 = AtomicI32::new(-1);

static PENDING_TERMINATE: AtomicBool = AtomicBool::new(false);
static PENDING_CHILD_EXIT: AtomicBool = AtomicBool::new(false);

/// Keeps the installed notifier's descriptors open for the life of the
/// process.
static INSTALLED: OnceLock<Notifier> = OnceLock::new();

/// A notification drained from the self-pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Stop accepting and shut down
    Terminate,
    /// At least one child process has exited
    ChildExited,
}

struct Inner {
    reader: UnixStream,
    writer: UnixStream,
    shutdown: AtomicBool,
}

/// Wake-up channel between signal handlers (or other threads) and a
/// dispatcher loop.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Notifier {
    pub fn new() -> Result<Self, ServerError> {
        let (reader, writer) = UnixStream::pair().map_err(ServerError::Notifier)?;
        reader.set_nonblocking(true).map_err(ServerError::Notifier)?;
        writer.set_nonblocking(true).map_err(ServerError::Notifier)?;

        Ok(Self {
            inner: Arc::new(Inner {
                reader,
                writer,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Requests termination. Sticky: once set, it stays set.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Consumes pending wake-up bytes and returns the events they stood for.
    pub fn drain(&self) -> Vec<Event> {
        let mut scratch = [0u8; 64];
        loop {
            match (&self.inner.reader).read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        // Pending flags belong to the installed notifier only.
        let installed = self.is_installed();
        let mut events = Vec::new();
        if installed && PENDING_TERMINATE.swap(false, Ordering::SeqCst) {
            self.inner.shutdown.store(true, Ordering::SeqCst);
        }
        if self.is_shutdown() {
            events.push(Event::Terminate);
        }
        if installed && PENDING_CHILD_EXIT.swap(false, Ordering::SeqCst) {
            events.push(Event::ChildExited);
        }

        if !events.is_empty() {
            debug!(?events, "Drained notifications");
        }
        events
    }

    fn wake(&self) {
        // A full pipe already guarantees a pending wake-up.
        let _ = (&self.inner.writer).write(&[1]);
    }

    fn is_installed(&self) -> bool {
        SIGNAL_PIPE.load(Ordering::SeqCst) == self.inner.writer.as_raw_fd()
    }
}

impl AsRawFd for Notifier {
    /// The read end, to be watched for readability.
    fn as_raw_fd(&self) -> RawFd {
        self.inner.reader.as_raw_fd()
    }
}

extern "C" fn on_terminate(_signal: libc::c_int) {
    PENDING_TERMINATE.store(true, Ordering::SeqCst);
    wake_from_handler();
}

extern "C" fn on_child_exit(_signal: libc::c_int) {
    PENDING_CHILD_EXIT.store(true, Ordering::SeqCst);
    wake_from_handler();
}

/// Async-signal-safe: a single `write(2)` on a non-blocking descriptor.
fn wake_from_handler() {
    let fd = SIGNAL_PIPE.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

fn set_disposition(
    signal: libc::c_int,
    handler: libc::sighandler_t,
    flags: libc::c_int,
) -> Result<(), ServerError> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = flags;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(signal, &action, std::ptr::null_mut()) == -1 {
            return Err(ServerError::Signal {
                signal,
                source: io::Error::last_os_error(),
            });
        }
    }
    Ok(())
}

/// Installs process-wide handlers that feed `notifier`.
///
/// SIGTERM and SIGINT request termination; SIGPIPE is ignored so a peer
/// closing mid-response surfaces as a write error. With `watch_children`,
/// SIGCHLD produces [`Event::ChildExited`]. Handlers are installed without
/// `SA_RESTART` so blocking waits return `EINTR`.
///
/// Handlers are process-wide, so only one notifier can ever be installed.
/// Installing a different one fails with [`ServerError::AlreadyInstalled`];
/// installing the same one again just re-applies the dispositions.
pub fn install(notifier: &Notifier, watch_children: bool) -> Result<(), ServerError> {
    let installed = INSTALLED.get_or_init(|| notifier.clone());
    if !Arc::ptr_eq(&installed.inner, &notifier.inner) {
        return Err(ServerError::AlreadyInstalled);
    }
    let notifier = installed;
    SIGNAL_PIPE.store(notifier.inner.writer.as_raw_fd(), Ordering::SeqCst);

    let terminate = on_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t;
    set_disposition(libc::SIGTERM, terminate, 0)?;
    set_disposition(libc::SIGINT, terminate, 0)?;
    set_disposition(libc::SIGPIPE, libc::SIG_IGN, 0)?;

    if watch_children {
        let child = on_child_exit as extern "C" fn(libc::c_int) as libc::sighandler_t;
        set_disposition(libc::SIGCHLD, child, libc::SA_NOCLDSTOP)?;
    }

    Ok(())
}

/// Detaches a freshly forked child from the parent's notifier.
///
/// SIGTERM and SIGINT are ignored: a Ctrl-C reaches the whole process
/// group, and an in-flight exchange must still finish while the parent
/// drains. SIGCHLD goes back to its default.
pub fn reset_in_child() {
    SIGNAL_PIPE.store(-1, Ordering::SeqCst);
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
        libc::signal(libc::SIGINT, libc::SIG_IGN);
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}
