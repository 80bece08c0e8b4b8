//! The podcache server binary.
//!
//! Configured entirely through `PODCACHE_*` environment variables; exits 0
//! on clean shutdown and non-zero on a fatal startup error.

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use podcache::config::ServerConfig;
use podcache::reporter;
use podcache::server::Server;
use podcache::tiered::TieredCache;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("podcache server starting up");

    let config = ServerConfig::from_env();
    info!(
        size_mb = config.size_mb,
        partitions = config.partitions,
        port = config.port,
        fs_root = %config.fs_root.display(),
        "configuration resolved"
    );

    let cache = match TieredCache::new(config.capacity_bytes(), config.partitions, &config.fs_root)
    {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            error!(%err, "failed to initialize cache");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&config, Arc::clone(&cache)) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, port = config.port, "failed to bind listening socket");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(%err, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };
    {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown signal received");
                shutdown.shutdown();
            }
        });
    }

    // Best-effort status reporting; the server runs fine without it.
    if let Err(err) = reporter::spawn(Arc::clone(&cache), shutdown.running_flag()) {
        warn!(%err, "failed to start status reporter");
    }

    server.run();

    info!("podcache server shutdown complete");
    ExitCode::SUCCESS
}
