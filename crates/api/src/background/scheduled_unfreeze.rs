//! Executes scheduled quarter unfreezes once their date has passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::engine::WorkflowEngine;

/// Run the scheduled-unfreeze loop until `cancel` is triggered.
pub async fn run(engine: Arc<WorkflowEngine>, period: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = period.as_secs(), "Scheduled unfreeze job started");

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scheduled unfreeze job stopping");
                break;
            }
            _ = interval.tick() => {
                match engine.run_scheduled_unfreezes(Utc::now()).await {
                    Ok(0) => {}
                    Ok(unfrozen) => tracing::info!(unfrozen, "Scheduled unfreezes executed"),
                    Err(e) => tracing::error!(error = %e, "Scheduled unfreeze check failed"),
                }
            }
        }
    }
}
