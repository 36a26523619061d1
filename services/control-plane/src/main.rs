//! sortie control plane
//!
//! Serves the control-plane API on a fixed address, for harnesses that
//! attach to an existing cluster instead of starting their own.

use anyhow::Result;
use sortie_control_plane::{config, server, state::AppState, store::Store};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to SORTIE_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting sortie control plane");
    info!(
        listen_addr = %config.listen_addr,
        retained_events = config.retained_events,
        "Configuration loaded"
    );

    let state = AppState::new(Store::with_retained_events(config.retained_events));
    let handle = server::start(config.listen_addr, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    handle.stop().await?;

    info!("Control plane shutdown complete");
    Ok(())
}
