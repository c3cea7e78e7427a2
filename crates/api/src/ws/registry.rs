use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::Utc;
use serde::Serialize;
use stride_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Identifies one live push channel (one socket of one tab or device).
pub type ChannelHandle = Uuid;

/// Why a non-blocking send to a channel did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The outbound queue is at capacity (slow consumer).
    Full,
    /// The writer task has gone away.
    Closed,
    /// No channel is registered under that handle.
    Unknown,
}

struct Channel {
    user_id: DbId,
    sender: mpsc::Sender<Message>,
    connected_at: Timestamp,
    last_seen: Timestamp,
}

/// Snapshot of one channel, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub handle: ChannelHandle,
    pub user_id: DbId,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
}

/// Live push channels, 0..N per user.
///
/// Thread-safe via interior `RwLock`; created once at startup, shared behind
/// an `Arc`, and drained with [`shutdown_all`](Self::shutdown_all).
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<ChannelHandle, Channel>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// `capacity` bounds each channel's outbound queue.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new channel for `user_id`.
    ///
    /// Returns the handle and the receiver the socket writer drains.
    pub async fn register(&self, user_id: DbId) -> (ChannelHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = Uuid::new_v4();
        let now = Utc::now();
        self.channels.write().await.insert(
            handle,
            Channel {
                user_id,
                sender: tx,
                connected_at: now,
                last_seen: now,
            },
        );
        (handle, rx)
    }

    /// Drop a channel. Its writer sees the queue close and ends the socket.
    ///
    /// Returns `false` if the handle was already gone.
    pub async fn unregister(&self, handle: ChannelHandle) -> bool {
        self.channels.write().await.remove(&handle).is_some()
    }

    /// Handles of every channel `user_id` currently holds.
    pub async fn channels_for(&self, user_id: DbId) -> Vec<ChannelHandle> {
        let mut handles: Vec<ChannelHandle> = self
            .channels
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.user_id == user_id)
            .map(|(h, _)| *h)
            .collect();
        handles.sort();
        handles
    }

    /// Queue `message` on one channel without waiting.
    pub async fn try_send(&self, handle: ChannelHandle, message: Message) -> Result<(), SendFailure> {
        let channels = self.channels.read().await;
        let channel = channels.get(&handle).ok_or(SendFailure::Unknown)?;
        channel.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    /// Record inbound activity on a channel.
    pub async fn touch(&self, handle: ChannelHandle) {
        if let Some(channel) = self.channels.write().await.get_mut(&handle) {
            channel.last_seen = Utc::now();
        }
    }

    /// Channels with no inbound activity for longer than `grace`.
    pub async fn stale_channels(&self, grace: std::time::Duration) -> Vec<ChannelHandle> {
        let Some(cutoff) = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|g| Utc::now().checked_sub_signed(g))
        else {
            return Vec::new();
        };
        self.channels
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.last_seen < cutoff)
            .map(|(h, _)| *h)
            .collect()
    }

    /// Send a Close frame if possible, then unregister.
    pub async fn close(&self, handle: ChannelHandle) -> bool {
        let removed = self.channels.write().await.remove(&handle);
        match removed {
            Some(channel) => {
                let _ = channel.sender.try_send(Message::Close(None));
                true
            }
            None => false,
        }
    }

    /// Snapshots of `user_id`'s channels, oldest connection first.
    pub async fn channels_of(&self, user_id: DbId) -> Vec<ChannelInfo> {
        let mut infos: Vec<ChannelInfo> = self
            .channels
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.user_id == user_id)
            .map(|(handle, c)| ChannelInfo {
                handle: *handle,
                user_id: c.user_id,
                connected_at: c.connected_at,
                last_seen: c.last_seen,
            })
            .collect();
        infos.sort_by_key(|i| (i.connected_at, i.handle));
        infos
    }

    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of distinct users with at least one channel.
    pub async fn user_count(&self) -> usize {
        let channels = self.channels.read().await;
        let mut users: Vec<DbId> = channels.values().map(|c| c.user_id).collect();
        users.sort_unstable();
        users.dedup();
        users.len()
    }

    /// Queue a protocol Ping on every channel. Full queues are skipped.
    pub async fn ping_all(&self) {
        let channels = self.channels.read().await;
        for channel in channels.values() {
            let _ = channel.sender.try_send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every channel, then clear the registry.
    pub async fn shutdown_all(&self) {
        let mut channels = self.channels.write().await;
        let count = channels.len();
        for channel in channels.values() {
            let _ = channel.sender.try_send(Message::Close(None));
        }
        channels.clear();
        tracing::info!(count, "Closed all notification channels");
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, handle: ChannelHandle, by: chrono::Duration) {
        if let Some(channel) = self.channels.write().await.get_mut(&handle) {
            channel.last_seen -= by;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn tracks_several_channels_per_user() {
        let registry = ConnectionRegistry::new(4);
        let (a, _rx_a) = registry.register(1).await;
        let (b, _rx_b) = registry.register(1).await;
        let (_c, _rx_c) = registry.register(2).await;

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(registry.channels_for(1).await, expected);
        assert_eq!(registry.connection_count().await, 3);
        assert_eq!(registry.user_count().await, 2);

        assert!(registry.unregister(a).await);
        assert!(!registry.unregister(a).await);
        assert_eq!(registry.channels_for(1).await, vec![b]);
    }

    #[tokio::test]
    async fn try_send_reports_full_and_closed() {
        let registry = ConnectionRegistry::new(1);
        let (full, _rx_full) = registry.register(1).await;
        let (closed, rx_closed) = registry.register(1).await;
        drop(rx_closed);

        assert_eq!(registry.try_send(full, Message::Text("a".into())).await, Ok(()));
        assert_eq!(
            registry.try_send(full, Message::Text("b".into())).await,
            Err(SendFailure::Full)
        );
        assert_eq!(
            registry.try_send(closed, Message::Text("a".into())).await,
            Err(SendFailure::Closed)
        );
        assert_eq!(
            registry.try_send(Uuid::new_v4(), Message::Text("a".into())).await,
            Err(SendFailure::Unknown)
        );
    }

    #[tokio::test]
    async fn silent_channels_become_stale_until_touched() {
        let registry = ConnectionRegistry::new(4);
        let (quiet, _rx_quiet) = registry.register(1).await;
        let (chatty, _rx_chatty) = registry.register(1).await;

        registry.backdate(quiet, chrono::Duration::seconds(120)).await;
        registry.backdate(chatty, chrono::Duration::seconds(120)).await;
        registry.touch(chatty).await;

        assert_eq!(registry.stale_channels(Duration::from_secs(60)).await, vec![quiet]);
    }

    #[tokio::test]
    async fn channels_of_reports_only_that_user() {
        let registry = ConnectionRegistry::new(4);
        let (first, _rx_first) = registry.register(1).await;
        let (second, _rx_second) = registry.register(1).await;
        let (_other, _rx_other) = registry.register(2).await;
        registry.backdate(second, chrono::Duration::seconds(30)).await;

        let infos = registry.channels_of(1).await;
        let mut handles: Vec<ChannelHandle> = infos.iter().map(|i| i.handle).collect();
        handles.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(handles, expected);
        assert!(infos.iter().all(|i| i.user_id == 1));

        let quiet = infos.iter().find(|i| i.handle == second).unwrap();
        assert!(quiet.last_seen < quiet.connected_at);
        assert!(registry.channels_of(3).await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let registry = ConnectionRegistry::new(4);
        let (_h, mut rx) = registry.register(1).await;

        registry.shutdown_all().await;

        assert_eq!(registry.connection_count().await, 0);
        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert!(rx.recv().await.is_none());
    }
}
