/**
 * Webhook Service
 *
 * Owns subscription rows, the event catalog, and event triggering.
 * `trigger_event` stamps the event id and timestamp once, matches active
 * subscriptions (event name membership plus optional top-level equality
 * filters), and enqueues one delivery job per surviving subscription.
 */

use std::collections::HashMap;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::webhook::{
    SubscriptionCreate, SubscriptionUpdate, WebhookDelivery, WebhookSubscription,
};
use crate::queue::{EnqueueOptions, JobQueue};

/// Registered event names. Subscribing to anything else is a validation
/// error; registering a new family is a code change here.
pub const EVENT_CATALOG: &[&str] = &[
    "user.created",
    "user.updated",
    "user.deleted",
    "user.login",
    "entity.created",
    "entity.updated",
    "entity.deleted",
    "task.started",
    "task.completed",
    "task.failed",
    "media.created",
    "media.updated",
    "media.deleted",
    "media.processed",
    "media.failed",
    "email.sent",
    "email.failed",
    "bulk_email.completed",
    "role.created",
    "role.updated",
    "permissions.updated",
    "test.ping",
];

/// Length of generated HMAC secrets (matches a 32-byte URL-safe token)
const GENERATED_SECRET_LEN: usize = 43;

/// Service for subscription management, matching, and delivery
pub struct WebhookService {
    pool: PgPool,
    queue: Arc<JobQueue>,
    pub(crate) http: reqwest::Client,
    /// `source` field stamped into every event payload
    pub(crate) source: String,
    pub(crate) backoff_ceiling_secs: i64,
}

impl WebhookService {
    pub fn new(pool: PgPool, queue: Arc<JobQueue>, source: String, backoff_ceiling_secs: u64) -> Self {
        Self {
            pool,
            queue,
            http: reqwest::Client::new(),
            source,
            backoff_ceiling_secs: backoff_ceiling_secs as i64,
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    // Subscription management

    /// Create a subscription; generates a secret when none is supplied.
    pub async fn create_subscription(
        &self,
        input: SubscriptionCreate,
    ) -> Result<WebhookSubscription, AppError> {
        validate_url(&input.url)?;
        validate_events(&input.events)?;

        let secret = input.secret.unwrap_or_else(generate_secret);
        let subscription = sqlx::query_as::<_, WebhookSubscription>(
            r#"
            INSERT INTO webhook_subscriptions
                (name, description, url, events, secret, active, headers, filters,
                 max_retries, retry_backoff, timeout_secs)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.url)
        .bind(&input.events)
        .bind(&secret)
        .bind(input.active.unwrap_or(true))
        .bind(input.headers.map(Json))
        .bind(input.filters.map(Json))
        .bind(input.max_retries.unwrap_or(3))
        .bind(input.retry_backoff.unwrap_or(60))
        .bind(input.timeout_secs.unwrap_or(10))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            subscription_id = subscription.id,
            url = %subscription.url,
            events = ?subscription.events,
            "webhook subscription created"
        );
        Ok(subscription)
    }

    /// Fetch one subscription
    pub async fn get_subscription(
        &self,
        id: i64,
    ) -> Result<Option<WebhookSubscription>, AppError> {
        let subscription = sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM webhook_subscriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    /// List subscriptions, optionally restricted to active ones or to a
    /// single event name
    pub async fn list_subscriptions(
        &self,
        active_only: bool,
        event: Option<&str>,
    ) -> Result<Vec<WebhookSubscription>, AppError> {
        let subscriptions = sqlx::query_as::<_, WebhookSubscription>(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE ($1 = FALSE OR active = TRUE)
              AND ($2::text IS NULL OR $2 = ANY(events))
            ORDER BY id ASC
            "#,
        )
        .bind(active_only)
        .bind(event)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    /// Apply a partial update; returns `None` for an unknown id
    pub async fn update_subscription(
        &self,
        id: i64,
        update: SubscriptionUpdate,
    ) -> Result<Option<WebhookSubscription>, AppError> {
        if let Some(url) = &update.url {
            validate_url(url)?;
        }
        if let Some(events) = &update.events {
            validate_events(events)?;
        }

        let mut qb = QueryBuilder::new("UPDATE webhook_subscriptions SET ");
        if let Some(name) = update.name {
            qb.push("name = ");
            qb.push_bind(name);
            qb.push(", ");
        }
        if let Some(description) = update.description {
            qb.push("description = ");
            qb.push_bind(description);
            qb.push(", ");
        }
        if let Some(url) = update.url {
            qb.push("url = ");
            qb.push_bind(url);
            qb.push(", ");
        }
        if let Some(events) = update.events {
            qb.push("events = ");
            qb.push_bind(events);
            qb.push(", ");
        }
        if let Some(headers) = update.headers {
            qb.push("headers = ");
            qb.push_bind(Json(headers));
            qb.push(", ");
        }
        if let Some(filters) = update.filters {
            qb.push("filters = ");
            qb.push_bind(Json(filters));
            qb.push(", ");
        }
        if let Some(max_retries) = update.max_retries {
            qb.push("max_retries = ");
            qb.push_bind(max_retries);
            qb.push(", ");
        }
        if let Some(retry_backoff) = update.retry_backoff {
            qb.push("retry_backoff = ");
            qb.push_bind(retry_backoff);
            qb.push(", ");
        }
        if let Some(timeout_secs) = update.timeout_secs {
            qb.push("timeout_secs = ");
            qb.push_bind(timeout_secs);
            qb.push(", ");
        }
        if let Some(active) = update.active {
            qb.push("active = ");
            qb.push_bind(active);
            qb.push(", ");
        }
        qb.push("updated_at = NOW() WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING *");

        let subscription: Option<WebhookSubscription> =
            qb.build_query_as().fetch_optional(&self.pool).await?;
        if subscription.is_some() {
            tracing::info!(subscription_id = id, "webhook subscription updated");
        }
        Ok(subscription)
    }

    /// Delete a subscription; delivery history is retained
    pub async fn delete_subscription(&self, id: i64) -> Result<bool, AppError> {
        let deleted: Option<(i64,)> =
            sqlx::query_as("DELETE FROM webhook_subscriptions WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        if deleted.is_some() {
            tracing::info!(subscription_id = id, "webhook subscription deleted");
        }
        Ok(deleted.is_some())
    }

    // Event triggering

    /// Trigger an event: match active subscriptions, evaluate filters,
    /// enqueue one delivery job each.
    ///
    /// The event id and timestamp are assigned here, not at delivery
    /// time, so retries carry the original values.
    ///
    /// # Returns
    ///
    /// The number of subscriptions a delivery was enqueued for.
    pub async fn trigger_event(
        &self,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<u32, AppError> {
        let subscriptions = sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM webhook_subscriptions WHERE active = TRUE AND $1 = ANY(events)",
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        if subscriptions.is_empty() {
            tracing::debug!(event_type, "no webhook subscriptions for event");
            return Ok(0);
        }

        let event_id = Uuid::new_v4().to_string();
        let payload = serde_json::json!({
            "event_type": event_type,
            "event_id": event_id,
            "timestamp": Utc::now().to_rfc3339(),
            "source": self.source,
            "version": "1.0",
            "data": data,
        });

        let mut triggered = 0;
        for subscription in subscriptions {
            if let Some(filters) = &subscription.filters {
                if !matches_filters(&payload["data"], &filters.0) {
                    tracing::debug!(
                        subscription_id = subscription.id,
                        event_type,
                        "event filtered out by subscription filters"
                    );
                    continue;
                }
            }

            self.queue
                .enqueue(
                    "deliver_webhook",
                    serde_json::json!({
                        "subscription_id": subscription.id,
                        "event_type": event_type,
                        "event_id": event_id,
                        "payload": payload,
                        "attempt_number": 1,
                    }),
                    EnqueueOptions::default(),
                )
                .await?;
            triggered += 1;
        }

        tracing::info!(
            event_type,
            event_id = %event_id,
            subscriptions_notified = triggered,
            "webhook event triggered"
        );
        Ok(triggered)
    }

    // Delivery logs

    /// Query the delivery audit trail, newest first
    pub async fn get_deliveries(
        &self,
        subscription_id: Option<i64>,
        event_type: Option<&str>,
        success_only: Option<bool>,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, AppError> {
        let deliveries = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE ($1::bigint IS NULL OR subscription_id = $1)
              AND ($2::text IS NULL OR event_type = $2)
              AND ($3::boolean IS NULL OR success = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(subscription_id)
        .bind(event_type)
        .bind(success_only)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;
        Ok(deliveries)
    }
}

/// All filter keys must match the event data top-level fields exactly
pub fn matches_filters(
    data: &serde_json::Value,
    filters: &HashMap<String, serde_json::Value>,
) -> bool {
    filters
        .iter()
        .all(|(key, expected)| data.get(key) == Some(expected))
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

fn validate_url(url: &str) -> Result<(), AppError> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::validation("url", "must be an http(s) URL"));
    }
    Ok(())
}

fn validate_events(events: &[String]) -> Result<(), AppError> {
    if events.is_empty() {
        return Err(AppError::validation("events", "must not be empty"));
    }
    for event in events {
        if !EVENT_CATALOG.contains(&event.as_str()) {
            return Err(AppError::validation(
                "events",
                format!("unknown event type: {event}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_filters_requires_all_keys() {
        let data = serde_json::json!({"role": "vip", "plan": "pro"});
        let mut filters = HashMap::new();
        filters.insert("role".to_string(), serde_json::json!("vip"));
        assert!(matches_filters(&data, &filters));

        filters.insert("plan".to_string(), serde_json::json!("free"));
        assert!(!matches_filters(&data, &filters));
    }

    #[test]
    fn test_matches_filters_is_top_level_only() {
        let data = serde_json::json!({"user": {"role": "vip"}});
        let mut filters = HashMap::new();
        filters.insert("role".to_string(), serde_json::json!("vip"));
        assert!(!matches_filters(&data, &filters));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let data = serde_json::json!({"id": 1});
        let mut filters = HashMap::new();
        filters.insert("role".to_string(), serde_json::Value::Null);
        // Absent field is not the same as an explicit null
        assert!(!matches_filters(&data, &filters));
    }

    #[test]
    fn test_event_validation_against_catalog() {
        assert!(validate_events(&["user.created".to_string()]).is_ok());
        assert!(validate_events(&["user.exploded".to_string()]).is_err());
        assert!(validate_events(&[]).is_err());
    }

    #[test]
    fn test_generated_secret_length() {
        let secret = generate_secret();
        assert_eq!(secret.len(), GENERATED_SECRET_LEN);
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_url("https://example.com/hook").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
    }
}
