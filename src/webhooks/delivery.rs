/**
 * Webhook Delivery
 *
 * One delivery attempt: sign the payload, POST it, classify the outcome,
 * append an immutable delivery record, and update the subscription's
 * aggregate counters in the same transaction.
 *
 * # Outcome Classification
 *
 * - 2xx             -> succeeded
 * - other 4xx       -> failed, never retried (the receiver rejected it)
 * - 5xx / timeout / connect error -> failed, retried while attempts
 *   remain; attempt n schedules attempt n+1 after
 *   `retry_backoff * 2^(n-1)` seconds, capped at the configured ceiling
 */

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::webhook::WebhookDelivery;
use crate::webhooks::service::WebhookService;
use crate::webhooks::signature;

/// Response bodies stored on delivery records are cut at this length
const RESPONSE_BODY_LIMIT: usize = 10_000;

/// Result of the HTTP step of a delivery, before persistence
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub success: bool,
    /// Whether the failure class is worth retrying (5xx, timeout,
    /// connection trouble). 4xx responses are permanent.
    pub retryable: bool,
}

/// Result shape for the synchronous `POST /webhooks/test` operation
#[derive(Debug, Clone, Serialize)]
pub struct WebhookTestResult {
    pub success: bool,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

/// Perform the HTTP step of a delivery: sign, POST, classify.
///
/// The request body is the canonical JSON rendering of the payload, the
/// exact bytes the signature covers.
pub async fn attempt_request(
    client: &reqwest::Client,
    url: &str,
    secret: &str,
    static_headers: Option<&HashMap<String, String>>,
    timeout: Duration,
    event_type: &str,
    event_id: &str,
    payload: &serde_json::Value,
) -> AttemptOutcome {
    let body = signature::canonical_json(payload);
    let signature_header = signature::sign(secret, payload);

    let mut request = client
        .post(url)
        .timeout(timeout)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", signature_header)
        .header("X-Webhook-Event", event_type)
        .header("X-Webhook-Delivery", event_id)
        .header("User-Agent", "ripple-webhooks/1.0");

    if let Some(headers) = static_headers {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
    }

    let started = Instant::now();
    match request.body(body).send().await {
        Ok(response) => {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let truncated: String = text.chars().take(RESPONSE_BODY_LIMIT).collect();
            let duration_ms = started.elapsed().as_millis() as i64;

            if status.is_success() {
                AttemptOutcome {
                    status_code: Some(status.as_u16() as i32),
                    response_body: Some(truncated),
                    error_message: None,
                    duration_ms,
                    success: true,
                    retryable: false,
                }
            } else {
                let snippet: String = truncated.chars().take(500).collect();
                AttemptOutcome {
                    status_code: Some(status.as_u16() as i32),
                    response_body: Some(truncated),
                    error_message: Some(format!("HTTP {}: {}", status.as_u16(), snippet)),
                    duration_ms,
                    success: false,
                    retryable: status.is_server_error(),
                }
            }
        }
        Err(e) => {
            let duration_ms = started.elapsed().as_millis() as i64;
            let message = if e.is_timeout() {
                format!("request timeout after {}s", timeout.as_secs())
            } else {
                format!("request error: {e}")
            };
            AttemptOutcome {
                status_code: None,
                response_body: None,
                error_message: Some(message),
                duration_ms,
                success: false,
                retryable: true,
            }
        }
    }
}

/// Delay before attempt `n + 1`, given failing attempt number `n`
pub fn next_retry_delay_secs(retry_backoff: i64, attempt_number: i32, ceiling: i64) -> i64 {
    let exponent = (attempt_number - 1).clamp(0, 30) as u32;
    retry_backoff
        .saturating_mul(1i64 << exponent)
        .min(ceiling.max(retry_backoff))
}

impl WebhookService {
    /// Deliver one attempt for a subscription and record the outcome.
    ///
    /// The delivery record insert and the subscription counter update
    /// commit in a single transaction.
    pub async fn deliver(
        &self,
        subscription_id: i64,
        event_type: &str,
        event_id: &str,
        payload: serde_json::Value,
        attempt_number: i32,
    ) -> Result<WebhookDelivery, AppError> {
        let subscription = self
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("webhook subscription {subscription_id}")))?;

        tracing::info!(
            subscription_id,
            event_type,
            attempt = attempt_number,
            url = %subscription.url,
            "delivering webhook"
        );

        let outcome = attempt_request(
            &self.http,
            &subscription.url,
            &subscription.secret,
            subscription.headers.as_ref().map(|h| &h.0),
            Duration::from_secs(subscription.timeout_secs.max(1) as u64),
            event_type,
            event_id,
            &payload,
        )
        .await;

        // max_retries counts retries, so a subscription allows
        // max_retries + 1 attempts in total
        let will_retry =
            !outcome.success && outcome.retryable && attempt_number <= subscription.max_retries;
        let next_retry_at: Option<DateTime<Utc>> = if will_retry {
            let delay = next_retry_delay_secs(
                subscription.retry_backoff,
                attempt_number,
                self.backoff_ceiling_secs,
            );
            Some(Utc::now() + TimeDelta::seconds(delay))
        } else {
            None
        };

        let mut tx = self.pool().begin().await?;

        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries
                (subscription_id, event_type, event_id, payload, url, status_code,
                 response_body, error_message, attempt_number, success, will_retry,
                 next_retry_at, duration_ms, delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(event_type)
        .bind(event_id)
        .bind(Json(payload))
        .bind(&subscription.url)
        .bind(outcome.status_code)
        .bind(&outcome.response_body)
        .bind(&outcome.error_message)
        .bind(attempt_number)
        .bind(outcome.success)
        .bind(will_retry)
        .bind(next_retry_at)
        .bind(outcome.duration_ms)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE webhook_subscriptions SET
                total_deliveries = total_deliveries + 1,
                successful_deliveries = successful_deliveries + CASE WHEN $2 THEN 1 ELSE 0 END,
                failed_deliveries = failed_deliveries + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_delivery_at = NOW(),
                last_success_at = CASE WHEN $2 THEN NOW() ELSE last_success_at END,
                last_failure_at = CASE WHEN $2 THEN last_failure_at ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(outcome.success)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if outcome.success {
            tracing::info!(
                subscription_id,
                delivery_id = delivery.id,
                status_code = ?outcome.status_code,
                duration_ms = outcome.duration_ms,
                "webhook delivered"
            );
        } else {
            tracing::warn!(
                subscription_id,
                delivery_id = delivery.id,
                status_code = ?outcome.status_code,
                error = ?outcome.error_message,
                will_retry,
                "webhook delivery failed"
            );
        }

        Ok(delivery)
    }

    /// One-shot `test.ping` delivery; no subscription, no audit record.
    pub async fn test_url(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        timeout_secs: u64,
    ) -> WebhookTestResult {
        let event_id = Uuid::new_v4().to_string();
        let payload = serde_json::json!({
            "event_type": "test.ping",
            "event_id": event_id,
            "timestamp": Utc::now().to_rfc3339(),
            "source": self.source,
            "version": "1.0",
            "data": {
                "message": "Webhook connectivity test",
                "test": true,
            },
        });

        let outcome = attempt_request(
            &self.http,
            url,
            // No subscription, no shared secret; sign with an empty key
            "",
            headers,
            Duration::from_secs(timeout_secs.max(1)),
            "test.ping",
            &event_id,
            &payload,
        )
        .await;

        WebhookTestResult {
            success: outcome.success,
            status_code: outcome.status_code,
            response_body: outcome.response_body,
            duration_ms: outcome.duration_ms,
            error_message: outcome.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double_from_base() {
        assert_eq!(next_retry_delay_secs(1, 1, 3600), 1);
        assert_eq!(next_retry_delay_secs(1, 2, 3600), 2);
        assert_eq!(next_retry_delay_secs(1, 3, 3600), 4);
        assert_eq!(next_retry_delay_secs(60, 1, 3600), 60);
        assert_eq!(next_retry_delay_secs(60, 2, 3600), 120);
    }

    #[test]
    fn test_retry_delay_hits_ceiling() {
        assert_eq!(next_retry_delay_secs(60, 10, 3600), 3600);
        assert_eq!(next_retry_delay_secs(1, 62, 3600), 3600);
    }

    #[test]
    fn test_retry_gap_strictly_grows_until_ceiling() {
        let mut previous = 0;
        for attempt in 1..=6 {
            let delay = next_retry_delay_secs(1, attempt, 3600);
            assert!(delay > previous);
            previous = delay;
        }
    }
}
