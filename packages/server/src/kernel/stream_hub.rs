//! In-process pub/sub hub for real-time streaming to websocket clients.
//!
//! Topics are opaque strings. Pipeline run events and digests go to the
//! owning user's topic (`user:<id>`); runs without an owner go to
//! [`SYSTEM_TOPIC`].
//!
//!   hub.publish(&user_topic(user_id), json!({"type": "pipeline_run.started", ...})).await;
//!   let rx = hub.subscribe(&user_topic(user_id)).await;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use crate::common::UserId;

/// Topic for events not owned by a user (system pipelines).
pub const SYSTEM_TOPIC: &str = "system";

pub fn user_topic(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

/// Thread-safe, cloneable hub keyed by topic.
/// Payloads are `serde_json::Value`; domains serialize their own types.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl StreamHub {
    /// Default capacity is 256 messages per channel.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish a JSON value to a topic. No-op if no subscribers.
    pub async fn publish(&self, topic: &str, value: serde_json::Value) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(topic) {
            // No active receivers is fine
            let _ = tx.send(value);
        }
    }

    /// Serialize and publish a typed event.
    pub async fn publish_event<T: Serialize>(&self, topic: &str, event: &T) {
        match serde_json::to_value(event) {
            Ok(value) => self.publish(topic, value).await,
            Err(e) => warn!(topic = %topic, error = %e, "failed to serialize stream event"),
        }
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Remove channels with zero subscribers (housekeeping).
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let hub = StreamHub::new();
        let topic = user_topic(UserId::new());
        let mut rx = hub.subscribe(&topic).await;

        let value = serde_json::json!({"type": "pipeline_run.started"});
        hub.publish(&topic, value.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = StreamHub::new();
        let mut alice = hub.subscribe(&user_topic(UserId::new())).await;
        hub.publish(&user_topic(UserId::new()), serde_json::json!({"x": 1}))
            .await;

        assert!(matches!(
            alice.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_event_serializes() {
        #[derive(Serialize)]
        struct Ping {
            n: u32,
        }

        let hub = StreamHub::new();
        let mut rx = hub.subscribe(SYSTEM_TOPIC).await;
        hub.publish_event(SYSTEM_TOPIC, &Ping { n: 7 }).await;
        assert_eq!(rx.recv().await.unwrap(), serde_json::json!({"n": 7}));
    }

    #[tokio::test]
    async fn test_cleanup_removes_empty_channels() {
        let hub = StreamHub::new();
        let rx = hub.subscribe("ephemeral").await;
        assert_eq!(hub.channels.read().await.len(), 1);

        drop(rx);
        hub.cleanup().await;

        assert_eq!(hub.channels.read().await.len(), 0);
    }
}
