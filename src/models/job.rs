/**
 * Job Records
 *
 * Jobs live in the shared store, not the database: a JSON record per
 * job plus the schedule sorted set. The record is the single source for
 * `GET /tasks/{id}/status`.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InFlight,
    Succeeded,
    Failed,
    RetryScheduled,
    Dead,
}

/// Serialized job state stored under `jobs:data:<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Globally unique opaque id
    pub id: String,
    /// Registered function name
    pub function: String,
    /// Function arguments, JSON-encoded
    pub args: serde_json::Value,
    pub status: JobStatus,
    /// Attempts so far; `attempt <= max_tries`
    pub attempt: u32,
    pub max_tries: u32,
    /// Idempotency key, when one was supplied
    pub key: Option<String>,
    pub enqueue_time: DateTime<Utc>,
    /// Invisible to workers until this instant
    pub scheduled_time: DateTime<Utc>,
    /// Not worth starting after this instant
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobRecord {
    /// Whether the job has reached a state it will never leave.
    /// `failed` is terminal here: retries travel through
    /// `retry_scheduled`, so a record parked on `failed` was removed or
    /// missed its deadline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Dead
        )
    }

    /// Whether the job is still waiting for a worker
    pub fn is_pending(&self) -> bool {
        matches!(self.status, JobStatus::Queued | JobStatus::RetryScheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(JobStatus::RetryScheduled).unwrap(),
            serde_json::json!("retry_scheduled")
        );
        assert_eq!(
            serde_json::to_value(JobStatus::InFlight).unwrap(),
            serde_json::json!("in_flight")
        );
    }

    #[test]
    fn test_terminal_states() {
        let mut record = JobRecord {
            id: "j1".to_string(),
            function: "process_media".to_string(),
            args: serde_json::json!({}),
            status: JobStatus::Queued,
            attempt: 0,
            max_tries: 3,
            key: None,
            enqueue_time: Utc::now(),
            scheduled_time: Utc::now(),
            deadline: None,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        };
        assert!(record.is_pending());
        assert!(!record.is_terminal());

        record.status = JobStatus::Dead;
        assert!(record.is_terminal());
        assert!(!record.is_pending());
    }
}
