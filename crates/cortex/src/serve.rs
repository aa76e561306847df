// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cortex serve`: run the engine's background work until a shutdown signal.

use std::time::Duration;

use cortex_agent::{drain, install_signal_handler, spawn_scheduler};
use cortex_config::CortexConfig;
use cortex_core::CortexError;
use tracing::{info, warn};

use crate::runtime::{open_engine, VaultAccess};

/// Upper bound on waiting for in-flight extraction during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_serve(config: CortexConfig) -> Result<(), CortexError> {
    info!(name = %config.engine.name, "starting cortex serve");

    let engine = open_engine(config, VaultAccess::IfPresent).await?;

    let health = engine.health().await;
    info!(
        status = ?health.status,
        memory_enabled = health.memory_enabled,
        extraction_enabled = health.extraction_enabled,
        extraction_mode = health.extraction_mode.as_str(),
        embedding_provider = ?health.embedding_provider,
        "engine ready"
    );

    let cancel = install_signal_handler();
    let scheduler = spawn_scheduler(engine.clone(), cancel.clone());

    cancel.cancelled().await;
    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    drain(&engine, DRAIN_TIMEOUT).await;

    info!("cortex serve shutdown complete");
    Ok(())
}
