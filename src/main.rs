//! Request shield server.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer ─▶ TimeoutLayer ─▶ security middleware
//!                                                        │
//!                       checks (ip, url, origin, ...)  ◀─┘
//!                                │ all passed
//!                                ▼
//!                            handler
//!                                │
//!     Client Response            ▼
//!     ◀────────────── transforms (headers, escape, compress)
//! ```
//!
//! Configuration is read from the TOML file given with `--config` and
//! watched for changes; without it the built-in defaults apply.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use request_shield::cache::MemoryCache;
use request_shield::clock::SystemClock;
use request_shield::config::{load_config, watcher::ConfigWatcher, ShieldConfig};
use request_shield::observability::{logging, metrics};
use request_shield::{AppState, HttpServer};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "request-shield")]
#[command(about = "Security pipeline in front of an HTTP application", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("request-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        checks = ?config.pipeline.request_checks,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock = Arc::new(SystemClock);
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    spawn_purger(cache.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let state = AppState::new(config, cache, clock)?;
    let server = HttpServer::new(state);

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            server.spawn_reloader(updates);
            Some(watcher.run()?)
        }
        None => None,
    };

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Periodically drop expired cache entries (rate windows, tokens, locks).
fn spawn_purger(cache: Arc<MemoryCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Expired cache entries removed");
            }
        }
    });
}
