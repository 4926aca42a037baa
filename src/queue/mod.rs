/**
 * Background Job Queue
 *
 * Durable task submission over the shared store. A job is a JSON record
 * (`jobs:data:<id>`) plus a member of the `jobs:queue` sorted set scored
 * by its scheduled epoch time, so delayed jobs are invisible until due
 * and ready jobs pop in FIFO order.
 *
 * # Idempotency
 *
 * `enqueue` with a key checks `jobs:key:<key>`; if it maps to a job that
 * is still pending, the existing id is returned and nothing is enqueued.
 *
 * # At-Least-Once
 *
 * Records persist before the schedule entry, workers take leases with a
 * TTL, and an expired lease puts the job back in the queue. Submission
 * is therefore at-least-once; job bodies must tolerate re-execution.
 */

pub mod notifications;
pub mod worker;

pub use notifications::NotificationBridge;
pub use worker::{JobContext, JobError, JobRegistry, Worker, WorkerConfig};

use chrono::{TimeDelta, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::{JobRecord, JobStatus};
use crate::store::SharedStore;

pub(crate) const QUEUE_KEY: &str = "jobs:queue";
pub(crate) const INFLIGHT_KEY: &str = "jobs:inflight";

pub(crate) fn data_key(id: &str) -> String {
    format!("jobs:data:{id}")
}

pub(crate) fn lease_key(id: &str) -> String {
    format!("jobs:lease:{id}")
}

fn idempotency_key(key: &str) -> String {
    format!("jobs:key:{key}")
}

/// Optional submission parameters
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Seconds before the job becomes visible to workers
    pub delay_secs: u64,
    /// Idempotency key; equal still-pending keys collapse to one job
    pub key: Option<String>,
    /// Drop the job instead of starting it after this instant
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    /// Override for the total attempt budget
    pub max_tries: Option<u32>,
}

/// Handle for submitting jobs and inspecting their state
pub struct JobQueue {
    store: SharedStore,
    default_max_tries: u32,
    result_ttl_secs: u64,
}

impl JobQueue {
    pub fn new(store: SharedStore, default_max_tries: u32, result_ttl_secs: u64) -> Self {
        Self {
            store,
            default_max_tries,
            result_ttl_secs,
        }
    }

    /// Submit a job.
    ///
    /// # Returns
    ///
    /// The job id: freshly generated, or the existing id when an equal
    /// idempotency key is still pending.
    pub async fn enqueue(
        &self,
        function: &str,
        args: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<String, AppError> {
        let mut conn = self.store.connection().await?;

        if let Some(key) = &options.key {
            let existing: Option<String> = conn.get(idempotency_key(key)).await?;
            if let Some(existing_id) = existing {
                if let Some(record) = self.load(&mut conn, &existing_id).await? {
                    if record.is_pending() {
                        tracing::debug!(
                            function,
                            key = %key,
                            job_id = %existing_id,
                            "idempotent enqueue returned existing job"
                        );
                        return Ok(existing_id);
                    }
                }
            }
        }

        let now = Utc::now();
        let scheduled = now + TimeDelta::seconds(options.delay_secs as i64);
        let record = JobRecord {
            id: Uuid::new_v4().to_string(),
            function: function.to_string(),
            args,
            status: JobStatus::Queued,
            attempt: 0,
            max_tries: options.max_tries.unwrap_or(self.default_max_tries).max(1),
            key: options.key.clone(),
            enqueue_time: now,
            scheduled_time: scheduled,
            deadline: options.deadline,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        };

        self.save(&mut conn, &record).await?;
        if let Some(key) = &options.key {
            let _: () = conn.set(idempotency_key(key), &record.id).await?;
        }
        let _: () = conn
            .zadd(QUEUE_KEY, &record.id, scheduled.timestamp_millis())
            .await?;

        tracing::info!(
            function,
            job_id = %record.id,
            delay_secs = options.delay_secs,
            "job enqueued"
        );
        Ok(record.id)
    }

    /// Fetch a job record by id
    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, AppError> {
        let mut conn = self.store.connection().await?;
        self.load(&mut conn, id).await
    }

    /// Remove a queued job before any worker leases it.
    ///
    /// Jobs already in flight are never cancelled mid-execution.
    ///
    /// # Returns
    ///
    /// Whether the job was still queued and is now removed.
    pub async fn cancel(&self, id: &str) -> Result<bool, AppError> {
        let mut conn = self.store.connection().await?;
        let removed: i64 = conn.zrem(QUEUE_KEY, id).await?;
        if removed == 0 {
            return Ok(false);
        }

        if let Some(mut record) = self.load(&mut conn, id).await? {
            record.status = JobStatus::Failed;
            record.finished_at = Some(Utc::now());
            record.error = Some("removed before execution".to_string());
            // Terminal save also clears the idempotency key
            self.save(&mut conn, &record).await?;
        }
        tracing::info!(job_id = id, "queued job removed");
        Ok(true)
    }

    /// Pop the next due job, if any. The ZREM return value arbitrates
    /// between competing workers; only the remover owns the job.
    pub(crate) async fn pop_due(&self) -> Result<Option<JobRecord>, AppError> {
        let mut conn = self.store.connection().await?;
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(QUEUE_KEY)
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(id) = due.into_iter().next() else {
            return Ok(None);
        };

        let removed: i64 = conn.zrem(QUEUE_KEY, &id).await?;
        if removed == 0 {
            // Another worker claimed it between the range and the remove
            return Ok(None);
        }

        self.load(&mut conn, &id).await
    }

    /// Put a job back on the schedule (retry or lease expiry)
    pub(crate) async fn reschedule(
        &self,
        record: &JobRecord,
    ) -> Result<(), AppError> {
        let mut conn = self.store.connection().await?;
        self.save(&mut conn, record).await?;
        let _: () = conn
            .zadd(
                QUEUE_KEY,
                &record.id,
                record.scheduled_time.timestamp_millis(),
            )
            .await?;
        Ok(())
    }

    /// Persist a record; terminal records get the result TTL, pending
    /// ones live until consumed.
    pub(crate) async fn save(
        &self,
        conn: &mut MultiplexedConnection,
        record: &JobRecord,
    ) -> Result<(), AppError> {
        let body = serde_json::to_string(record)?;
        if record.is_terminal() {
            let _: () = conn
                .set_ex(data_key(&record.id), body, self.result_ttl_secs)
                .await?;
            if let Some(key) = &record.key {
                let _: () = conn.del(idempotency_key(key)).await?;
            }
        } else {
            let _: () = conn.set(data_key(&record.id), body).await?;
        }
        Ok(())
    }

    pub(crate) async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
    ) -> Result<Option<JobRecord>, AppError> {
        let raw: Option<String> = conn.get(data_key(id)).await?;
        match raw {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Publish a JSON progress message through the store's pub/sub
    pub async fn publish(
        &self,
        subject: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AppError> {
        self.store.publish(subject, payload).await
    }
}
