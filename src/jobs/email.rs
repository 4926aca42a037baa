/**
 * Email Jobs
 *
 * Single sends and rate-limited bulk sends. SMTP itself is an external
 * collaborator behind the `Mailer` seam; the shipped implementation
 * logs the send so the pipeline is observable end to end without mail
 * credentials.
 */

use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::jobs::JobDependencies;
use crate::queue::worker::{JobContext, JobError, JobResult};

/// An email ready to hand to the transport
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
}

/// Transport seam; implementations speak SMTP, an API, or nothing
pub trait Mailer: Send + Sync {
    fn send<'a>(&'a self, message: &'a OutgoingEmail) -> BoxFuture<'a, Result<(), String>>;
}

/// Mailer that records sends in the log instead of delivering them
pub struct LogMailer {
    from_email: String,
    from_name: String,
}

impl LogMailer {
    pub fn new(from_email: String, from_name: String) -> Self {
        Self {
            from_email,
            from_name,
        }
    }
}

impl Mailer for LogMailer {
    fn send<'a>(&'a self, message: &'a OutgoingEmail) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            tracing::info!(
                from = %format!("{} <{}>", self.from_name, self.from_email),
                to = %message.to_email,
                subject = %message.subject,
                html = message.html_body.is_some(),
                "email send (log transport)"
            );
            Ok(())
        })
    }
}

#[derive(Debug, Deserialize)]
struct SingleEmailArgs {
    #[serde(flatten)]
    email: OutgoingEmail,
    #[serde(default)]
    user_id: Option<i64>,
}

/// Send one email; emits `email.sent` / `email.failed`
pub async fn send_single_email(
    ctx: JobContext,
    args: serde_json::Value,
    deps: JobDependencies,
) -> JobResult {
    let args: SingleEmailArgs =
        serde_json::from_value(args).map_err(|e| JobError::failed(format!("bad args: {e}")))?;

    match deps.mailer.send(&args.email).await {
        Ok(()) => {
            notify(&ctx, args.user_id, "sent", &args.email.to_email).await;
            dispatch_event(
                &deps,
                "email.sent",
                serde_json::json!({
                    "to_email": args.email.to_email,
                    "subject": args.email.subject,
                    "user_id": args.user_id,
                }),
            )
            .await;
            Ok(serde_json::json!({"sent": true, "to_email": args.email.to_email}))
        }
        Err(error) => {
            notify(&ctx, args.user_id, "failed", &args.email.to_email).await;
            dispatch_event(
                &deps,
                "email.failed",
                serde_json::json!({
                    "to_email": args.email.to_email,
                    "subject": args.email.subject,
                    "error": error,
                }),
            )
            .await;
            Err(JobError::failed(format!(
                "send to {} failed: {error}",
                args.email.to_email
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkEmailArgs {
    emails: Vec<OutgoingEmail>,
    /// Maximum sends per minute
    #[serde(default = "default_rate_limit")]
    rate_limit: u32,
}

fn default_rate_limit() -> u32 {
    10
}

/// Send a batch with pacing; publishes progress per send and emits
/// `bulk_email.completed` at the end.
pub async fn send_bulk_emails(
    ctx: JobContext,
    args: serde_json::Value,
    deps: JobDependencies,
) -> JobResult {
    let args: BulkEmailArgs =
        serde_json::from_value(args).map_err(|e| JobError::failed(format!("bad args: {e}")))?;

    let total = args.emails.len();
    let pause = pacing_interval(args.rate_limit);
    let mut sent = 0usize;
    let mut failed = 0usize;

    for (index, email) in args.emails.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(pause).await;
        }

        match deps.mailer.send(email).await {
            Ok(()) => sent += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(to = %email.to_email, error = %error, "bulk send failure, continuing");
            }
        }

        let payload = serde_json::json!({
            "type": "task_notification",
            "channel": "tasks",
            "data": {
                "task_id": ctx.job_id,
                "sent": sent,
                "failed": failed,
                "total": total,
                "progress": ((index + 1) * 100 / total.max(1)) as u32,
            },
        });
        let subject = format!("task_notifications:{}", ctx.job_id);
        if let Err(e) = ctx.publish(&subject, &payload).await {
            tracing::warn!(subsystem = "notifications", error = %e, "bulk progress publish failed");
        }
    }

    dispatch_event(
        &deps,
        "bulk_email.completed",
        serde_json::json!({"sent": sent, "failed": failed, "total": total}),
    )
    .await;

    Ok(serde_json::json!({"sent": sent, "failed": failed, "total": total}))
}

async fn notify(ctx: &JobContext, user_id: Option<i64>, status: &str, to_email: &str) {
    let entity = user_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| ctx.job_id.clone());
    let subject = format!("task_notifications:{entity}");
    let payload = serde_json::json!({
        "type": "task_notification",
        "channel": "tasks",
        "data": {
            "task_id": ctx.job_id,
            "to_email": to_email,
            "status": status,
        },
    });
    if let Err(e) = ctx.publish(&subject, &payload).await {
        tracing::warn!(subsystem = "notifications", error = %e, "email notification publish failed");
    }
}

/// Seconds between sends for a per-minute budget
fn pacing_interval(rate_limit: u32) -> std::time::Duration {
    std::time::Duration::from_millis(60_000 / u64::from(rate_limit.max(1)))
}

async fn dispatch_event(deps: &JobDependencies, event: &str, data: serde_json::Value) {
    if let Err(e) = deps.webhooks.trigger_event(event, data).await {
        tracing::warn!(subsystem = "webhooks", event, error = %e, "event dispatch failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_interval_from_rate() {
        assert_eq!(pacing_interval(10), std::time::Duration::from_secs(6));
        assert_eq!(pacing_interval(60), std::time::Duration::from_secs(1));
        // A zero rate must not divide by zero
        assert_eq!(pacing_interval(0), std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_single_email_args_flatten() {
        let args: SingleEmailArgs = serde_json::from_value(serde_json::json!({
            "to_email": "a@b.c",
            "subject": "hi",
            "body": "text",
            "user_id": 4,
        }))
        .unwrap();
        assert_eq!(args.email.to_email, "a@b.c");
        assert_eq!(args.user_id, Some(4));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_messages() {
        let mailer = LogMailer::new("noreply@example.com".to_string(), "Ripple".to_string());
        let email = OutgoingEmail {
            to_email: "user@example.com".to_string(),
            subject: "Welcome".to_string(),
            body: "Hello".to_string(),
            html_body: None,
        };
        assert!(mailer.send(&email).await.is_ok());
    }
}
