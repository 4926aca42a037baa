/**
 * Per-Kind Channel Handles
 *
 * A `Channel` is the handle a resource service broadcasts on. It binds a
 * channel name to the shared `ConnectionManager` and is injected into the
 * service at construction, so the engine never reaches for fabric
 * internals.
 *
 * Broadcast failures are logged here and never surface to callers;
 * fan-out is best-effort by contract.
 */

use std::sync::Arc;

use crate::channels::envelope::Envelope;
use crate::channels::manager::ConnectionManager;

/// Broadcast handle for one named channel
#[derive(Clone)]
pub struct Channel {
    name: String,
    manager: Arc<ConnectionManager>,
}

impl Channel {
    pub fn new(name: impl Into<String>, manager: Arc<ConnectionManager>) -> Self {
        Self {
            name: name.into(),
            manager,
        }
    }

    /// The channel (and kind) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broadcast a `created` event with the new instance's output shape
    pub async fn broadcast_created(&self, data: serde_json::Value) -> usize {
        self.broadcast(Envelope::model_event("created", &self.name, data), None)
            .await
    }

    /// Broadcast an `updated` event with the full updated output shape
    pub async fn broadcast_updated(&self, data: serde_json::Value) -> usize {
        self.broadcast(Envelope::model_event("updated", &self.name, data), None)
            .await
    }

    /// Broadcast a `deleted` event; carries only the id
    pub async fn broadcast_deleted(&self, id: i64) -> usize {
        self.broadcast(
            Envelope::model_event("deleted", &self.name, serde_json::json!({ "id": id })),
            None,
        )
        .await
    }

    /// Broadcast a custom event type on this channel
    pub async fn broadcast_custom(&self, event: &str, data: serde_json::Value) -> usize {
        self.broadcast(Envelope::model_event(event, &self.name, data), None)
            .await
    }

    /// Broadcast with origin suppression
    pub async fn broadcast_excluding(&self, envelope: Envelope, exclude_client: &str) -> usize {
        self.broadcast(envelope, Some(exclude_client)).await
    }

    async fn broadcast(&self, envelope: Envelope, exclude_client: Option<&str>) -> usize {
        let delivered = self
            .manager
            .broadcast_to_channel(&self.name, envelope, exclude_client)
            .await;
        tracing::debug!(
            "[Channels] Broadcast on '{}' reached {} client(s)",
            self.name,
            delivered
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deleted_event_carries_only_id() {
        let manager = Arc::new(ConnectionManager::new(vec!["users".to_string()], 8));
        let channel = Channel::new("users", manager.clone());

        let (_id, mut rx) = manager.connect("users", Some("c".to_string())).await.unwrap();
        rx.recv().await.unwrap(); // welcome

        channel.broadcast_deleted(42).await;
        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "deleted");
        assert_eq!(value["data"], serde_json::json!({"id": 42}));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_zero() {
        let manager = Arc::new(ConnectionManager::new(vec!["media".to_string()], 8));
        let channel = Channel::new("media", manager);
        let delivered = channel
            .broadcast_created(serde_json::json!({"id": 1}))
            .await;
        assert_eq!(delivered, 0);
    }
}
