//! Best-effort push of persisted notifications to live channels.
//!
//! Push happens after the notification is durable, so a failed push loses
//! nothing: the recipient catches up through the listing endpoint. A single
//! task drains the store's commit feed, so every channel sees notifications
//! in the order they were persisted.

use std::sync::Arc;

use axum::extract::ws::Message;
use serde::Serialize;
use stride_core::notification::Notification;
use stride_core::types::DbId;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::ws::registry::{ChannelHandle, ConnectionRegistry, SendFailure};

/// Outcome of pushing one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub notification_id: DbId,
    pub recipient_id: DbId,
    /// Channels the frame was queued on.
    pub delivered: Vec<ChannelHandle>,
    /// Channels that could not take the frame; these were unregistered.
    pub failed: Vec<ChannelHandle>,
}

#[derive(Serialize)]
struct NewNotificationFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    notification: &'a Notification,
}

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Queue `notification` on every channel of its recipient.
    ///
    /// Never blocks: a full or closed channel is logged and dropped, and the
    /// remaining channels are still served.
    pub async fn push(&self, notification: &Notification) -> DeliveryReport {
        let mut report = DeliveryReport {
            notification_id: notification.id,
            recipient_id: notification.recipient_id,
            ..Default::default()
        };

        let handles = self.registry.channels_for(notification.recipient_id).await;
        if handles.is_empty() {
            return report;
        }

        let frame = NewNotificationFrame {
            kind: "new_notification",
            notification,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, notification_id = notification.id, "Failed to encode notification");
                return report;
            }
        };

        for handle in handles {
            match self.registry.try_send(handle, Message::Text(text.clone().into())).await {
                Ok(()) => report.delivered.push(handle),
                Err(SendFailure::Unknown) => {
                    // Unregistered between listing and sending.
                }
                Err(failure) => {
                    tracing::warn!(
                        channel = %handle,
                        recipient_id = notification.recipient_id,
                        ?failure,
                        "Dropping notification channel"
                    );
                    self.registry.unregister(handle).await;
                    report.failed.push(handle);
                }
            }
        }

        tracing::debug!(
            notification_id = notification.id,
            recipient_id = notification.recipient_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Notification pushed"
        );
        report
    }

    /// Push everything the commit feed yields until its senders are gone.
    pub async fn run(self: Arc<Self>, mut feed: UnboundedReceiver<Notification>) {
        while let Some(notification) = feed.recv().await {
            self.push(&notification).await;
        }
        tracing::debug!("Commit feed closed; dispatcher stopped");
    }
}
