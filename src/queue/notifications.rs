/**
 * Task Notification Bridge
 *
 * Workers publish progress to `task_notifications:<entity_id>` through
 * the store's pub/sub. This bridge holds a pattern subscription on
 * `task_notifications:*` and forwards each JSON message to the channel
 * fabric, closing the loop between background execution and connected
 * WebSocket clients.
 *
 * # Message Convention
 *
 * Published payloads are JSON objects:
 *
 * ```json
 * {"type": "task_notification", "channel": "media", "data": {...}}
 * ```
 *
 * `type` defaults to `task_notification` and `channel` to `tasks` when
 * absent. Anything that is not JSON is dropped with a warning.
 */

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::channels::{ConnectionManager, Envelope};
use crate::error::AppError;
use crate::store::SharedStore;

const SUBSCRIPTION_PATTERN: &str = "task_notifications:*";
const DEFAULT_CHANNEL: &str = "tasks";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Forwards store pub/sub messages to the channel fabric
pub struct NotificationBridge {
    store: SharedStore,
    manager: Arc<ConnectionManager>,
}

impl NotificationBridge {
    pub fn new(store: SharedStore, manager: Arc<ConnectionManager>) -> Self {
        Self { store, manager }
    }

    /// Run forever, resubscribing after store interruptions
    pub async fn run(self) {
        if !self.store.is_enabled() {
            tracing::warn!(
                subsystem = "notifications",
                "shared store disabled, task notifications will not reach clients"
            );
            return;
        }

        loop {
            if let Err(e) = self.listen().await {
                tracing::warn!(
                    subsystem = "notifications",
                    error = %e,
                    "notification subscription lost, reconnecting"
                );
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn listen(&self) -> Result<(), AppError> {
        let mut pubsub = self.store.pubsub().await?;
        pubsub.psubscribe(SUBSCRIPTION_PATTERN).await?;
        tracing::info!(
            "[Notifications] Subscribed to {} via the shared store",
            SUBSCRIPTION_PATTERN
        );

        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let subject = message.get_channel_name().to_string();
            let raw: String = match message.get_payload() {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(subsystem = "notifications", subject, error = %e, "unreadable message");
                    continue;
                }
            };

            let payload: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        subsystem = "notifications",
                        subject,
                        error = %e,
                        "dropping non-JSON notification"
                    );
                    continue;
                }
            };

            self.forward(payload).await;
        }

        Err(AppError::internal("pub/sub message stream ended"))
    }

    /// Route one decoded notification payload onto the fabric
    pub async fn forward(&self, payload: serde_json::Value) {
        let channel = payload
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_CHANNEL)
            .to_string();
        let event = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("task_notification")
            .to_string();
        let data = payload.get("data").cloned().unwrap_or(payload);

        let delivered = self
            .manager
            .broadcast_to_channel(&channel, Envelope::model_event(event, &channel, data), None)
            .await;
        tracing::debug!(
            "[Notifications] Forwarded frame to '{}' ({} client(s))",
            channel,
            delivered
        );
    }
}
