//! Server Configuration
//!
//! Command-line arguments, with environment fallbacks for everything but
//! the port.
//!
//! ```bash
//! minihttpd 8080 --mode pool --workers 32 --root /srv/www
//! MINIHTTPD_MODE=select MINIHTTPD_ROOT=/srv/www minihttpd 8080
//! ```

use crate::dispatch::Mode;
use clap::Parser;
use std::path::PathBuf;

/// Minimal static file server
#[derive(Debug, Clone, Parser)]
#[command(name = "minihttpd")]
#[command(about = "Minimal static file server with selectable concurrency models")]
#[command(version)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Concurrency model
    #[arg(long, value_enum, default_value = "pool", env = "MINIHTTPD_MODE")]
    pub mode: Mode,

    /// Worker threads for the pool model
    #[arg(long, default_value_t = crate::DEFAULT_WORKERS, env = "MINIHTTPD_WORKERS")]
    pub workers: usize,

    /// Directory files are served from
    #[arg(long, default_value = ".", env = "MINIHTTPD_ROOT")]
    pub root: PathBuf,

    /// Address to bind
    #[arg(long, default_value = crate::DEFAULT_HOST, env = "MINIHTTPD_HOST")]
    pub host: String,
}

impl Config {
    /// Bind address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be >= 1".to_string());
        }
        if !self.root.is_dir() {
            return Err(format!("root {} is not a directory", self.root.display()));
        }
        Ok(())
    }
}
