//! AnyData Cache host process
//!
//! Opens the cache, keeps the day change sweep running, and shuts both down
//! cleanly on SIGINT/SIGTERM.

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anydata_cache::{spawn_day_change_task, Config, DataCache, SweepSchedule};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache (starts the worker and the start-up sweep)
/// 4. Start the day change sweep task
/// 5. Wait for a shutdown signal, then drain the worker
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anydata_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AnyData cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: path={}, storage_limit={} bytes",
        config.cache_path().display(),
        config.storage_limit_bytes
    );

    let cache = DataCache::open(&config)?;
    let stats = cache.stats().await?;
    info!(
        "Cache holds {} records ({} bytes, {} auto-delete)",
        stats.total_entries, stats.total_bytes, stats.auto_delete_bytes
    );

    let sweeper = spawn_day_change_task(cache.clone(), SweepSchedule::DailyAtMidnight);
    info!("Day change sweep task started");

    shutdown_signal().await;

    sweeper.abort();
    warn!("Day change sweep task aborted");

    cache.shutdown().await;
    info!("Cache shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
