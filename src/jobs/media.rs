/**
 * Media Processing Jobs
 *
 * `process_media` runs the requested operations against a media row,
 * publishing progress to `task_notifications:<media_id>` along the way
 * so subscribers on the `media` channel watch it happen. The terminal
 * frame is an `updated` event carrying the finished row.
 *
 * Pixel work sits behind the `MediaProcessor` seam and runs on the
 * blocking pool; the shipped implementation derives paths without
 * touching bytes (the object store is an external collaborator).
 */

use std::sync::Arc;

use serde::Deserialize;

use crate::jobs::JobDependencies;
use crate::models::media;
use crate::queue::worker::{JobContext, JobError, JobResult};

/// Seam for the actual image work; implementations may shell out to an
/// encoder or talk to an object store.
pub trait MediaProcessor: Send + Sync {
    /// Produce a thumbnail for `source_path`, returning the new path
    fn generate_thumbnail(&self, source_path: &str) -> Result<String, String>;

    /// Re-encode the source in place
    fn optimize(&self, source_path: &str) -> Result<(), String>;
}

/// Default processor: derives deterministic artifact paths and leaves
/// byte handling to the storage backend.
pub struct PassthroughProcessor;

impl MediaProcessor for PassthroughProcessor {
    fn generate_thumbnail(&self, source_path: &str) -> Result<String, String> {
        Ok(format!("{source_path}.thumb.jpg"))
    }

    fn optimize(&self, _source_path: &str) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProcessMediaArgs {
    media_id: i64,
    #[serde(default = "default_operations")]
    operations: Vec<String>,
}

fn default_operations() -> Vec<String> {
    vec!["thumbnail".to_string(), "optimize".to_string()]
}

/// Run the full processing pipeline for one media row
pub async fn process_media(
    ctx: JobContext,
    args: serde_json::Value,
    deps: JobDependencies,
) -> JobResult {
    let args: ProcessMediaArgs =
        serde_json::from_value(args).map_err(|e| JobError::failed(format!("bad args: {e}")))?;

    let row = media::get_media(&ctx.pool, args.media_id)
        .await?
        .ok_or_else(|| JobError::failed(format!("media {} not found", args.media_id)))?;

    let subject = format!("task_notifications:{}", args.media_id);
    publish_progress(&ctx, &subject, args.media_id, "started", 0).await;

    let total = args.operations.len().max(1);
    let mut thumbnail_path: Option<String> = None;

    for (index, operation) in args.operations.iter().enumerate() {
        let progress = (((index + 1) * 100) / total).min(99) as u32;
        match operation.as_str() {
            "thumbnail" => {
                thumbnail_path = Some(
                    run_blocking(deps.processor.clone(), row.storage_path.clone(), |p, path| {
                        p.generate_thumbnail(&path)
                    })
                    .await?,
                );
            }
            "optimize" => {
                run_blocking(deps.processor.clone(), row.storage_path.clone(), |p, path| {
                    p.optimize(&path).map(|_| String::new())
                })
                .await?;
            }
            other => {
                tracing::warn!(media_id = args.media_id, operation = other, "unknown operation, skipping");
                continue;
            }
        }
        publish_progress(&ctx, &subject, args.media_id, operation, progress).await;
    }

    let updated = media::mark_processed(&ctx.pool, args.media_id, thumbnail_path.clone())
        .await?
        .ok_or_else(|| JobError::failed(format!("media {} vanished mid-job", args.media_id)))?;

    publish_progress(&ctx, &subject, args.media_id, "completed", 100).await;

    // Terminal frame: the updated row, exactly as a PATCH would broadcast
    let row_json = serde_json::to_value(&updated)
        .map_err(|e| JobError::failed(format!("row did not serialize: {e}")))?;
    let _ = ctx
        .publish(
            &subject,
            &serde_json::json!({
                "type": "updated",
                "channel": "media",
                "data": row_json,
            }),
        )
        .await;

    if let Err(e) = deps
        .webhooks
        .trigger_event("media.processed", row_json.clone())
        .await
    {
        tracing::warn!(
            subsystem = "webhooks",
            media_id = args.media_id,
            error = %e,
            "media.processed dispatch failed"
        );
    }

    Ok(serde_json::json!({
        "media_id": args.media_id,
        "operations": args.operations,
        "thumbnail_path": thumbnail_path,
    }))
}

#[derive(Debug, Deserialize)]
struct ThumbnailArgs {
    media_id: i64,
}

/// Generate only the thumbnail for a media row
pub async fn generate_thumbnail(
    ctx: JobContext,
    args: serde_json::Value,
    deps: JobDependencies,
) -> JobResult {
    let args: ThumbnailArgs =
        serde_json::from_value(args).map_err(|e| JobError::failed(format!("bad args: {e}")))?;

    let row = media::get_media(&ctx.pool, args.media_id)
        .await?
        .ok_or_else(|| JobError::failed(format!("media {} not found", args.media_id)))?;

    let thumbnail = run_blocking(deps.processor.clone(), row.storage_path.clone(), |p, path| {
        p.generate_thumbnail(&path)
    })
    .await?;

    media::set_thumbnail(&ctx.pool, args.media_id, &thumbnail).await?;

    let subject = format!("task_notifications:{}", args.media_id);
    publish_progress(&ctx, &subject, args.media_id, "thumbnail", 100).await;

    Ok(serde_json::json!({
        "media_id": args.media_id,
        "thumbnail_path": thumbnail,
    }))
}

async fn run_blocking<F>(
    processor: Arc<dyn MediaProcessor>,
    path: String,
    f: F,
) -> Result<String, JobError>
where
    F: FnOnce(&dyn MediaProcessor, String) -> Result<String, String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(processor.as_ref(), path))
        .await
        .map_err(|e| JobError::failed(format!("processor task panicked: {e}")))?
        .map_err(JobError::Failed)
}

async fn publish_progress(
    ctx: &JobContext,
    subject: &str,
    media_id: i64,
    step: &str,
    progress: u32,
) {
    let payload = serde_json::json!({
        "type": "task_notification",
        "channel": "media",
        "data": {
            "task_id": ctx.job_id,
            "media_id": media_id,
            "step": step,
            "progress": progress,
        },
    });
    if let Err(e) = ctx.publish(subject, &payload).await {
        tracing::warn!(
            subsystem = "notifications",
            media_id,
            error = %e,
            "progress publish failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_thumbnail_path() {
        let processor = PassthroughProcessor;
        assert_eq!(
            processor.generate_thumbnail("/media/cat.png").unwrap(),
            "/media/cat.png.thumb.jpg"
        );
    }

    #[test]
    fn test_args_default_operations() {
        let args: ProcessMediaArgs =
            serde_json::from_value(serde_json::json!({"media_id": 7})).unwrap();
        assert_eq!(args.operations, vec!["thumbnail", "optimize"]);
    }
}
