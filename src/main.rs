//! minihttpd - A Minimal Static File Server
//!
//! This is the main entry point. It parses the configuration, binds the
//! listener, installs signal handlers and hands control to the selected
//! dispatcher until termination is requested.

use anyhow::Context;
use clap::Parser;
use minihttpd::dispatch::{Mode, ServerContext};
use minihttpd::signal::{self, Notifier};
use minihttpd::{transport, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments (prints usage and exits on error)
    let config = Config::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let listener = transport::bind(&config.host, config.port)?;
    info!(
        "minihttpd v{} listening on {} ({:?} mode)",
        minihttpd::VERSION,
        config.address(),
        config.mode
    );

    // Termination and, for the process model, child-exit notifications
    let notifier = Notifier::new()?;
    signal::install(&notifier, config.mode == Mode::Fork)?;

    let ctx = ServerContext::new(&config.root, notifier);
    let mut dispatcher = config.mode.dispatcher(config.workers);
    let served = dispatcher.serve(listener, &ctx)?;

    info!(dispatcher = dispatcher.name(), "Server shutdown complete");
    println!("Finishing program cleanly... {} operations served", served);
    Ok(())
}
