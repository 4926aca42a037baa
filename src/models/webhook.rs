/**
 * Webhook Models
 *
 * Subscriptions configure where events are delivered; delivery rows are
 * the immutable audit trail, one per attempt. Deliveries reference
 * subscriptions by id only, so deleting a subscription never corrupts
 * history.
 */

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Webhook subscription row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookSubscription {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    /// Event names this subscription listens to
    pub events: Vec<String>,
    /// HMAC key; never serialized into API responses
    #[serde(skip_serializing)]
    pub secret: String,
    pub active: bool,
    /// Static headers added to every delivery
    pub headers: Option<Json<HashMap<String, String>>>,
    /// Top-level equality filters evaluated against event data
    pub filters: Option<Json<HashMap<String, serde_json::Value>>>,
    pub max_retries: i32,
    /// Base backoff in seconds; attempt n+1 is scheduled after
    /// `retry_backoff * 2^(n-1)`
    pub retry_backoff: i64,
    pub timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Shape accepted when creating a subscription
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    pub events: Vec<String>,
    /// Generated when omitted
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub filters: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub max_retries: Option<i32>,
    #[serde(default)]
    pub retry_backoff: Option<i64>,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Shape accepted when partially updating a subscription
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub filters: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub max_retries: Option<i32>,
    #[serde(default)]
    pub retry_backoff: Option<i64>,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Aggregate counters projected for `GET .../{id}/stats`
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStats {
    pub subscription_id: i64,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl WebhookSubscription {
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            subscription_id: self.id,
            total_deliveries: self.total_deliveries,
            successful_deliveries: self.successful_deliveries,
            failed_deliveries: self.failed_deliveries,
            last_delivery_at: self.last_delivery_at,
            last_success_at: self.last_success_at,
            last_failure_at: self.last_failure_at,
        }
    }
}

/// One delivery attempt; immutable once written
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookDelivery {
    pub id: i64,
    pub subscription_id: i64,
    pub event_type: String,
    pub event_id: String,
    pub payload: Json<serde_json::Value>,
    pub url: String,
    pub status_code: Option<i32>,
    /// Truncated response body for inspection
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub attempt_number: i32,
    pub success: bool,
    pub will_retry: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_serializes() {
        let subscription = WebhookSubscription {
            id: 1,
            name: "audit".to_string(),
            description: None,
            url: "https://example.com/hook".to_string(),
            events: vec!["user.created".to_string()],
            secret: "top-secret".to_string(),
            active: true,
            headers: None,
            filters: None,
            max_retries: 3,
            retry_backoff: 60,
            timeout_secs: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_delivery_at: None,
            last_success_at: None,
            last_failure_at: None,
        };
        let json = serde_json::to_value(&subscription).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["events"][0], "user.created");
    }
}
