//! # minihttpd - A Minimal Static File Server
//!
//! minihttpd answers `GET` requests with the contents of files under a
//! document root. The interesting part is not the protocol, which is a tiny
//! subset of HTTP, but the three interchangeable ways of running many
//! exchanges at once on top of a single per-connection state machine.
//!
//! ## Features
//!
//! - **One state machine**: every client is a [`Connection`] stepping
//!   through `Receiving -> Sending -> Terminated`
//! - **Three dispatchers**: process per connection, `select(2)` event loop,
//!   or a fixed worker-thread pool
//! - **Graceful shutdown**: SIGTERM/SIGINT stop accepting, let in-flight
//!   work settle, and report how many exchanges succeeded
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              minihttpd                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │ TCP Listener│───>│                Dispatcher                    │    │
//! │  └─────────────┘    │  ┌──────────┐  ┌────────────┐  ┌──────────┐  │    │
//! │         ▲           │  │  fork    │  │  select    │  │  pool    │  │    │
//! │         │           │  │ children │  │ event loop │  │ workers  │  │    │
//! │  ┌──────┴──────┐    │  └────┬─────┘  └─────┬──────┘  └────┬─────┘  │    │
//! │  │  Notifier   │    └───────┼──────────────┼──────────────┼────────┘    │
//! │  │ (self-pipe) │            └──────────────┼──────────────┘             │
//! │  └─────────────┘                           ▼                            │
//! │         ▲                 ┌──────────────────────────────────┐          │
//! │         │                 │ Connection: parse -> resolve ->  │          │
//! │   SIGTERM/SIGINT          │ header + file chunks -> outcome  │          │
//! │   SIGCHLD                 └────────────────┬─────────────────┘          │
//! │                                            ▼                            │
//! │                                  ServerStats (operations)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use minihttpd::dispatch::{Mode, ServerContext};
//! use minihttpd::signal::{self, Notifier};
//! use minihttpd::transport;
//!
//! fn main() -> anyhow::Result<()> {
//!     let listener = transport::bind("127.0.0.1", 8080)?;
//!     let notifier = Notifier::new()?;
//!     signal::install(&notifier, false)?;
//!
//!     let ctx = ServerContext::new("/srv/www", notifier);
//!     let served = Mode::Pool.dispatcher(16).serve(listener, &ctx)?;
//!     println!("{} operations served", served);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`connection`]: per-client state machine and server statistics
//! - [`protocol`]: request parsing and response headers
//! - [`dispatch`]: the three concurrency models
//! - [`signal`]: signal handlers and the self-pipe notifier
//! - [`transport`]: socket setup and readiness waits
//! - [`config`]: command-line configuration
//!
//! ## Outcomes
//!
//! Each exchange ends with an [`Outcome`]. Only `Ok` counts as an
//! operation. A transport failure (`Bad`) overrides an earlier 404/403, and
//! in the process model the outcome is the child's exit status.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod signal;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::Config;
pub use connection::{Connection, Outcome, ServerStats, State};
pub use dispatch::{Dispatcher, Mode, ServerContext};
pub use error::{ConnectionError, ServerError};
pub use protocol::{ParseError, Request};
pub use signal::Notifier;

/// Default number of worker threads in the pool model
pub const DEFAULT_WORKERS: usize = 16;

/// The default host minihttpd binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of minihttpd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
