/**
 * Task Routes
 *
 * Submission endpoints for the built-in job families (202 + `task_id`),
 * status polling, and removal of still-queued jobs.
 */

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::job::JobRecord;
use crate::queue::{EnqueueOptions, JobQueue};

/// 202 response body for every submission endpoint
#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessMediaRequest {
    pub media_id: i64,
    #[serde(default)]
    pub operations: Option<Vec<String>>,
    /// Optional idempotency key
    #[serde(default)]
    pub key: Option<String>,
}

/// `POST /tasks/media/process`
pub async fn submit_process_media(
    State(queue): State<Arc<JobQueue>>,
    Json(request): Json<ProcessMediaRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    let mut args = serde_json::json!({ "media_id": request.media_id });
    if let Some(operations) = request.operations {
        args["operations"] = serde_json::json!(operations);
    }

    let task_id = queue
        .enqueue(
            "process_media",
            args,
            EnqueueOptions {
                key: request.key,
                ..Default::default()
            },
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailRequest {
    pub media_id: i64,
}

/// `POST /tasks/media/thumbnail`
pub async fn submit_thumbnail(
    State(queue): State<Arc<JobQueue>>,
    Json(request): Json<ThumbnailRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    let task_id = queue
        .enqueue(
            "generate_thumbnail",
            serde_json::json!({ "media_id": request.media_id }),
            EnqueueOptions::default(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SendEmailRequest {
    pub to_email: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// `POST /tasks/email/send`
pub async fn submit_email(
    State(queue): State<Arc<JobQueue>>,
    Json(request): Json<SendEmailRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    if !request.to_email.contains('@') {
        return Err(AppError::validation("to_email", "must be a valid address"));
    }

    let task_id = queue
        .enqueue(
            "send_single_email",
            serde_json::to_value(&request)?,
            EnqueueOptions::default(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BulkEmailRequest {
    pub emails: Vec<serde_json::Value>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

/// `POST /tasks/email/bulk`
pub async fn submit_bulk_email(
    State(queue): State<Arc<JobQueue>>,
    Json(request): Json<BulkEmailRequest>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    if request.emails.is_empty() {
        return Err(AppError::validation("emails", "must not be empty"));
    }

    let task_id = queue
        .enqueue(
            "send_bulk_emails",
            serde_json::to_value(&request)?,
            EnqueueOptions::default(),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

/// Status projection for polling clients
#[derive(Debug, Serialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub function: String,
    pub status: crate::models::job::JobStatus,
    pub attempt: u32,
    pub enqueue_time: chrono::DateTime<chrono::Utc>,
    pub scheduled_time: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<JobRecord> for TaskStatus {
    fn from(record: JobRecord) -> Self {
        Self {
            task_id: record.id,
            function: record.function,
            status: record.status,
            attempt: record.attempt,
            enqueue_time: record.enqueue_time,
            scheduled_time: record.scheduled_time,
            started_at: record.started_at,
            finished_at: record.finished_at,
            result: record.result,
            error: record.error,
        }
    }
}

/// `GET /tasks/{id}/status`
pub async fn task_status(
    State(queue): State<Arc<JobQueue>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatus>, AppError> {
    let record = queue
        .get_job(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("tasks/{id}")))?;
    Ok(Json(record.into()))
}

/// `DELETE /tasks/{id}`: remove a job that has not been leased yet
pub async fn remove_task(
    State(queue): State<Arc<JobQueue>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if queue.cancel(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("tasks/{id} (queued)")))
    }
}
