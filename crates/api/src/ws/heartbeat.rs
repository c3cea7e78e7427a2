use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::registry::ConnectionRegistry;

/// Spawn a task that queues a protocol Ping on every channel each `period`.
pub fn start_heartbeat(
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let count = registry.connection_count().await;
                    tracing::trace!(count, "Notification channel heartbeat");
                    registry.ping_all().await;
                }
            }
        }
    })
}

/// Spawn a task that closes channels silent for longer than `grace`.
///
/// Any inbound frame (including Pong replies to the heartbeat) refreshes a
/// channel, so only dead peers age out.
pub fn start_liveness_monitor(
    registry: Arc<ConnectionRegistry>,
    grace: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let period = (grace / 3).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    for handle in registry.stale_channels(grace).await {
                        if registry.close(handle).await {
                            tracing::info!(channel = %handle, "Closed silent notification channel");
                        }
                    }
                }
            }
        }
    })
}
