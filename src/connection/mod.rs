//! Connection Module
//!
//! This module holds the per-client state machine shared by every
//! dispatcher, and the statistics the dispatchers update when they retire
//! a connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │  Connection::new(...)  │  state = Receiving
//!           └────────────┬───────────┘
//!                        │
//!                        │ handed to a dispatcher
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  fork child  │  select loop  │  pool worker                 │
//! │                                                             │
//! │      step() ... step() ... step()  until Terminated         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        ▼
//!          ServerStats::connection_retired(outcome)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use minihttpd::connection::{Connection, Outcome, ServerStats};
//! use std::net::TcpListener;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").unwrap();
//! let stats = Arc::new(ServerStats::new());
//! let root: Arc<Path> = Arc::from(Path::new("."));
//!
//! let (stream, addr) = listener.accept().unwrap();
//! stats.connection_opened();
//! let outcome = Connection::new(stream, root, Arc::clone(&stats))
//!     .with_peer(addr)
//!     .run_to_completion();
//! stats.connection_retired(outcome);
//! if outcome != Outcome::Ok {
//!     eprintln!("exchange failed: {:?}", outcome);
//! }
//! ```

pub mod client;
pub mod stats;

// Re-export commonly used types
pub use client::{Connection, Outcome, State, WriteCursor, BUFFER_SIZE, MAX_HEADER_SIZE};
pub use stats::ServerStats;
