// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic background work: batch extraction, expiry purge and the idle
//! session sweep. Runs until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use cortex_config::ExtractionMode;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Claims older than this are considered abandoned.
pub const STALE_CLAIM_SECS: u64 = 600;

fn ticker(every: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Start the scheduler on the current runtime.
pub fn spawn_scheduler(engine: Arc<Engine>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_scheduler(engine, cancel))
}

pub async fn run_scheduler(engine: Arc<Engine>, cancel: CancellationToken) {
    let extraction = engine.extraction();
    let extraction_active = extraction.is_active();
    let batch_enabled = extraction_active && extraction.mode() == ExtractionMode::Batch;
    if extraction_active {
        recover_claims(&engine).await;
    }

    let config = engine.config();
    let mut extract_tick = ticker(Duration::from_secs(config.extraction.interval_secs.max(1)));
    let mut maintenance_tick = ticker(Duration::from_secs(config.memory.purge_interval_secs.max(1)));
    // Both intervals fire immediately; skip that first tick.
    extract_tick.tick().await;
    maintenance_tick.tick().await;
    info!(
        batch_extraction = batch_enabled,
        interval_secs = config.extraction.interval_secs,
        purge_interval_secs = config.memory.purge_interval_secs,
        "scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("scheduler shutting down");
                break;
            }
            _ = extract_tick.tick(), if extraction_active => {
                recover_claims(&engine).await;
                if !batch_enabled {
                    continue;
                }
                match engine.run_extraction(None).await {
                    Ok(report) if report.total > 0 => {
                        debug!(total = report.total, completed = report.completed, "scheduled extraction ran");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "scheduled extraction failed (non-fatal)"),
                }
            }
            _ = maintenance_tick.tick() => {
                match engine.run_maintenance().await {
                    Ok(report) => debug!(
                        purged = report.purged_memories,
                        swept = report.swept_sessions,
                        "maintenance ran"
                    ),
                    Err(e) => warn!(error = %e, "maintenance failed (non-fatal)"),
                }
            }
        }
    }
}

/// Return abandoned claims to the queue; called at start and on every
/// extraction tick.
async fn recover_claims(engine: &Engine) {
    if let Err(e) = engine.extraction().recover_stale(STALE_CLAIM_SECS).await {
        warn!(error = %e, "failed to recover stale extraction claims");
    }
}
