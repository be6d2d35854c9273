//! Swap Executor - cross-chain swap and bridge execution service
//!
//! Loads chains, liquidity sources and a signing key from configuration and
//! serves the execution engine over HTTP.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};

use swap_executor::api::{self, AppState};
use swap_executor::chain::{ChainManager, EvmWallet};
use swap_executor::config::Settings;
use swap_executor::metrics::{self, MetricsServer};
use swap_executor::SwapEngine;

const DEFAULT_KEY_ENV: &str = "SWAP_EXECUTOR_PRIVATE_KEY";
const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Swap Executor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    // Initialize chain manager (handles all chain connections)
    let chain_manager = Arc::new(ChainManager::new(&settings)?);
    info!("Chain connections initialized");

    let key_env = settings
        .wallet
        .private_key_env
        .clone()
        .unwrap_or_else(|| DEFAULT_KEY_ENV.to_string());
    let wallet = Arc::new(EvmWallet::from_env(chain_manager.clone(), &key_env)?);

    let engine = Arc::new(SwapEngine::from_settings(&settings, wallet)?);
    info!("Execution engine initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            engine: engine.clone(),
            chain_manager: chain_manager.clone(),
            started_at: Instant::now(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let chain_manager = chain_manager.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS))
                    .await;

                for (chain_id, healthy) in chain_manager.health_check().await {
                    metrics::record_chain_health(chain_id, healthy);
                    if !healthy {
                        warn!("Chain {} health check failed", chain_id);
                    }
                }

                metrics::record_health_check();
            }
        }
    });

    info!("Swap Executor is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    let in_flight = engine.active_routes();
    if !in_flight.is_empty() {
        warn!(
            "Stopping with {} bridge routes still being tracked",
            in_flight.len()
        );
    }

    // Abort background tasks
    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Swap Executor stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,swap_executor=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
