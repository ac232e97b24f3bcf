//! PEcoin Server - Main entry point

use pecoin_core::{Error, Result};
use pecoin_engine::spawn_maintenance;
use pecoin_server::{build_router, AppConfig, AppState};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pecoin_server=info,pecoin_engine=info,pecoin_networking=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!("FATAL: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    info!("Starting PEcoin server v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config).await?;
    let cancel = CancellationToken::new();

    let sweeper = spawn_maintenance(state.registry.clone(), config.caches.sweep_interval(), &cancel);
    let refresher = config
        .ecosystem
        .auto_refresh
        .then(|| state.ecosystem.clone().spawn_auto_refresh(cancel.child_token()));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("cannot bind {}: {}", addr, e)))?;
    info!("Listening on {}", addr);

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let app = build_router(state, &config.server);
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::NetworkError(e.to_string()))?;

    cancel.cancel();
    sweeper.shutdown().await;
    if let Some(handle) = refresher {
        let _ = handle.await;
    }
    info!("Server stopped");
    Ok(())
}
