/**
 * Webhook Delivery Job
 *
 * One queue job per delivery attempt. A retryable failure re-enqueues
 * the next attempt itself, delayed by the subscription's backoff
 * schedule, and then reports success to the queue so the generic retry
 * machinery never double-drives the webhook state machine.
 */

use serde::Deserialize;

use crate::error::AppError;
use crate::jobs::JobDependencies;
use crate::queue::worker::{JobContext, JobError, JobResult};
use crate::queue::EnqueueOptions;

#[derive(Debug, Clone, Deserialize)]
struct DeliverWebhookArgs {
    subscription_id: i64,
    event_type: String,
    event_id: String,
    payload: serde_json::Value,
    #[serde(default = "first_attempt")]
    attempt_number: i32,
}

fn first_attempt() -> i32 {
    1
}

/// Execute one delivery attempt and schedule the next when warranted
pub async fn deliver_webhook(
    _ctx: JobContext,
    args: serde_json::Value,
    deps: JobDependencies,
) -> JobResult {
    let args: DeliverWebhookArgs =
        serde_json::from_value(args).map_err(|e| JobError::failed(format!("bad args: {e}")))?;

    let delivery = match deps
        .webhooks
        .deliver(
            args.subscription_id,
            &args.event_type,
            &args.event_id,
            args.payload.clone(),
            args.attempt_number,
        )
        .await
    {
        Ok(delivery) => delivery,
        // Subscription deleted between trigger and delivery: history
        // stays intact, nothing to deliver to
        Err(AppError::NotFound { .. }) => {
            tracing::warn!(
                subscription_id = args.subscription_id,
                event_type = %args.event_type,
                "subscription gone before delivery, dropping"
            );
            return Ok(serde_json::json!({"skipped": "subscription deleted"}));
        }
        Err(e) => return Err(e.into()),
    };

    if delivery.will_retry {
        let delay_secs = delivery
            .next_retry_at
            .map(|at| (at - chrono::Utc::now()).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let next = serde_json::json!({
            "subscription_id": args.subscription_id,
            "event_type": args.event_type,
            "event_id": args.event_id,
            "payload": args.payload,
            "attempt_number": args.attempt_number + 1,
        });

        deps.queue
            .enqueue(
                "deliver_webhook",
                next,
                EnqueueOptions {
                    delay_secs,
                    ..Default::default()
                },
            )
            .await
            .map_err(JobError::from)?;

        tracing::info!(
            subscription_id = args.subscription_id,
            event_type = %args.event_type,
            next_attempt = args.attempt_number + 1,
            delay_secs,
            "webhook retry scheduled"
        );
    }

    Ok(serde_json::json!({
        "delivery_id": delivery.id,
        "subscription_id": args.subscription_id,
        "event_type": args.event_type,
        "success": delivery.success,
        "status_code": delivery.status_code,
        "attempt_number": args.attempt_number,
        "will_retry": delivery.will_retry,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_to_first_attempt() {
        let args: DeliverWebhookArgs = serde_json::from_value(serde_json::json!({
            "subscription_id": 3,
            "event_type": "user.created",
            "event_id": "e-1",
            "payload": {"data": {}},
        }))
        .unwrap();
        assert_eq!(args.attempt_number, 1);
    }
}
