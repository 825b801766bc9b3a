//! bounce: an event-driven TCP echo server
//!
//! Accepts any number of concurrent client connections and writes every
//! byte it receives straight back, multiplexing non-blocking sockets
//! through a single readiness-polling loop (epoll on Linux, kqueue on
//! macOS). SIGINT/SIGTERM request a clean shutdown.

use bounce::config::Config;
use bounce::{reactor, shutdown};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        buffer_size = config.buffer_size,
        "Starting bounce echo server"
    );

    let stop = shutdown::install()?;
    reactor::run(&config, &stop)?;

    info!("Server stopped");
    Ok(())
}
