//! Error Types
//!
//! Two families of errors exist:
//!
//! - [`ConnectionError`]: something went wrong with one client. The
//!   connection is torn down with outcome `Bad` and the server carries on.
//! - [`ServerError`]: the server itself cannot run (bind failed, a signal
//!   handler could not be installed, a worker thread could not start).
//!   These abort startup.
//!
//! A missing or unreadable file is neither: it is answered with a 404 or
//! 403 and recorded as the connection's outcome.

use crate::protocol::ParseError;

/// Errors that terminate a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Reading from the transport failed
    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    /// Writing to the transport failed
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    /// Peer closed the transport before a complete header arrived
    #[error("end of input before a complete header")]
    IncompleteHeader,

    /// The read buffer filled up without a complete header
    #[error("request header exceeds {max} bytes")]
    HeaderTooLarge { max: usize },

    /// The request line could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Reading the served file failed mid-stream
    #[error("resource read error: {0}")]
    ResourceRead(#[source] std::io::Error),
}

/// Fatal errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A signal handler could not be installed
    #[error("failed to install handler for signal {signal}: {source}")]
    Signal {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    /// Signal handlers already feed a different notifier
    #[error("signal handlers are already installed for another notifier")]
    AlreadyInstalled,

    /// A worker thread could not be spawned
    #[error("failed to spawn worker {index}: {source}")]
    SpawnWorker {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// The listening socket could not be configured
    #[error("failed to configure listening socket: {0}")]
    Listener(#[source] std::io::Error),

    /// The readiness wait failed for a reason other than an interruption
    #[error("readiness wait failed: {0}")]
    Poll(#[source] std::io::Error),

    /// The notification self-pipe could not be created
    #[error("failed to create notifier: {0}")]
    Notifier(#[source] std::io::Error),
}
