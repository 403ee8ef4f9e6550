//! # NOS Runtime - Main Entry Point
//!
//! Starts the infrastructure and application event buses and serves remote
//! components and applications until Ctrl+C.

use anyhow::{Context, Result};
use nos_runtime::logging::init_logging;
use nos_runtime::{NosRuntime, RuntimeConfig};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();
    init_logging(&config.logging).context("failed to initialize logging")?;

    let runtime = Arc::new(NosRuntime::new(config).context("failed to build the event core")?);
    runtime.start().context("failed to start the event core")?;

    info!("NOS event core is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // Shutdown blocks for up to the grace period per bus.
    let stopping = Arc::clone(&runtime);
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .context("shutdown task failed")?;

    Ok(())
}
