/**
 * WebSocket Envelope
 *
 * Every frame the fabric sends is an `Envelope`: a `type` discriminator
 * plus whatever metadata that frame carries. Fields that do not apply to
 * a given frame are omitted from the JSON entirely.
 *
 * # Frame Types
 *
 * Server -> client: `connection`, `created`, `updated`, `deleted`,
 * custom event names, `task_notification`, `stats`, `pong`, `echo`.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A JSON frame delivered to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Frame discriminator (`created`, `pong`, ...)
    #[serde(rename = "type")]
    pub event: String,

    /// Resource kind the frame concerns, when it concerns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Channel the frame was delivered on; stamped at broadcast time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Receiving client's id (connection frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Human-readable note (connection / pong frames)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Frame payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Echoed client frame (echo frames only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<serde_json::Value>,

    /// RFC 3339 UTC timestamp
    pub timestamp: String,
}

impl Envelope {
    /// Create a bare envelope of the given type, stamped with now
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            model: None,
            channel: None,
            client_id: None,
            message: None,
            data: None,
            original: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Welcome frame sent right after registration
    pub fn connection(channel: &str, client_id: &str) -> Self {
        let mut envelope = Self::new("connection");
        envelope.message = Some(format!("Connected to channel: {channel}"));
        envelope.channel = Some(channel.to_string());
        envelope.client_id = Some(client_id.to_string());
        envelope
    }

    /// Mutation frame (`created` / `updated` / `deleted` / custom)
    pub fn model_event(event: impl Into<String>, model: &str, data: serde_json::Value) -> Self {
        let mut envelope = Self::new(event);
        envelope.model = Some(model.to_string());
        envelope.data = Some(data);
        envelope
    }

    /// Reply to a client `ping`
    pub fn pong() -> Self {
        let mut envelope = Self::new("pong");
        envelope.message = Some("pong".to_string());
        envelope
    }

    /// Reply to a client `get_stats`
    pub fn stats(data: serde_json::Value) -> Self {
        let mut envelope = Self::new("stats");
        envelope.data = Some(data);
        envelope
    }

    /// Echo of an unrecognized client frame (liveness probe)
    pub fn echo(original: serde_json::Value) -> Self {
        let mut envelope = Self::new("echo");
        envelope.message = Some("Message received".to_string());
        envelope.original = Some(original);
        envelope
    }

    /// Set the channel field (stamped by the manager at broadcast time)
    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = Some(channel.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_fields_are_omitted() {
        let json = serde_json::to_value(Envelope::pong()).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["message"], "pong");
        assert!(json.get("model").is_none());
        assert!(json.get("data").is_none());
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_model_event_shape() {
        let envelope = Envelope::model_event(
            "created",
            "users",
            serde_json::json!({"id": 1, "email": "a@b"}),
        )
        .with_channel("users");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "created");
        assert_eq!(json["model"], "users");
        assert_eq!(json["channel"], "users");
        assert_eq!(json["data"]["id"], 1);
    }

    #[test]
    fn test_connection_frame_names_client() {
        let envelope = Envelope::connection("media", "client-7");
        assert_eq!(envelope.client_id.as_deref(), Some("client-7"));
        assert_eq!(
            envelope.message.as_deref(),
            Some("Connected to channel: media")
        );
    }
}
