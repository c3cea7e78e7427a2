//! Periodic announcement of overdue initiatives.
//!
//! Overdue is derived from `due_date`, so nothing changes status; the sweep
//! only stamps `overdue_notified_at` and notifies assignees and the creator
//! once per initiative.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::engine::WorkflowEngine;

/// Upper bound on initiatives announced per tick.
const BATCH_SIZE: i64 = 200;

/// Run the overdue sweep loop until `cancel` is triggered.
pub async fn run(engine: Arc<WorkflowEngine>, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Overdue sweep started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Overdue sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match engine.sweep_overdue(Utc::now(), BATCH_SIZE).await {
                    Ok(0) => tracing::debug!("Overdue sweep: nothing new"),
                    Ok(announced) => tracing::info!(announced, "Overdue sweep: initiatives announced"),
                    Err(e) => tracing::error!(error = %e, "Overdue sweep failed"),
                }
            }
        }
    }
}
