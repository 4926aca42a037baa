/**
 * Worker
 *
 * Pulls due jobs from the queue, runs them on a concurrency-bounded
 * pool, and drives the retry state machine.
 *
 * # Leases
 *
 * A worker claims a job by removing it from the schedule and writing
 * `jobs:lease:<id>` with a TTL, heartbeating at half the lease period
 * for as long as the job runs. A companion reaper task scans in-flight
 * jobs and requeues any whose lease has expired (worker crash), so no
 * job is lost between claim and completion.
 *
 * # Retries
 *
 * A failed attempt with budget remaining is rescheduled after
 * `backoff_base * 2^n` seconds (n = prior retries, capped at the
 * ceiling). An exhausted job transitions to `dead` and is retained for
 * inspection until its record expires.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use futures_util::future::BoxFuture;
use redis::AsyncCommands;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::{JobRecord, JobStatus};
use crate::queue::{data_key, lease_key, JobQueue, INFLIGHT_KEY};
use crate::store::SharedStore;

/// Failure raised by a job body
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<AppError> for JobError {
    fn from(error: AppError) -> Self {
        Self::Failed(error.to_string())
    }
}

impl From<sqlx::Error> for JobError {
    fn from(error: sqlx::Error) -> Self {
        Self::Failed(format!("database error: {error}"))
    }
}

pub type JobResult = Result<serde_json::Value, JobError>;

type JobHandler = Arc<dyn Fn(JobContext, serde_json::Value) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// Everything a job body gets from its surroundings
#[derive(Clone)]
pub struct JobContext {
    pub job_id: String,
    /// 1-indexed attempt number for this execution
    pub attempt: u32,
    pub pool: PgPool,
    store: SharedStore,
}

impl JobContext {
    /// Publish a progress message (JSON, always) to a pub/sub subject,
    /// typically `task_notifications:<entity_id>`.
    pub async fn publish(&self, subject: &str, payload: &serde_json::Value) -> Result<(), JobError> {
        self.store.publish(subject, payload).await?;
        Ok(())
    }
}

/// Named job functions a worker can dispatch to
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<String, JobHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job function under its queue name
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(JobContext, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = JobResult> + Send + 'static,
    {
        self.handlers.insert(
            name.to_string(),
            Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        );
    }

    fn get(&self, name: &str) -> Option<JobHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Worker tuning knobs, derived from `Settings`
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub job_timeout: Duration,
    pub lease_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_ceiling_secs: u64,
    pub poll_interval: Duration,
}

/// Job consumer; one per process, jobs run on an internal pool
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    registry: Arc<JobRegistry>,
    store: SharedStore,
    pool: PgPool,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: JobRegistry,
        store: SharedStore,
        pool: PgPool,
        config: WorkerConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            id: format!("worker-{}", Uuid::new_v4().simple()),
            queue,
            registry: Arc::new(registry),
            store,
            pool,
            config,
            semaphore,
        }
    }

    /// Run the dispatch loop forever. Spawns the lease reaper alongside.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            worker_id = %self.id,
            concurrency = self.config.concurrency,
            functions = ?self.registry.function_names(),
            "worker started"
        );

        let reaper = self.clone();
        tokio::spawn(async move { reaper.reap_loop().await });

        loop {
            let popped = self.queue.pop_due().await;
            match popped {
                Ok(Some(record)) => {
                    let permit = match self.semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.execute(record).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    tracing::warn!(subsystem = "queue", error = %e, "queue poll failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn execute(&self, mut record: JobRecord) {
        if let Some(deadline) = record.deadline {
            if Utc::now() > deadline {
                record.status = JobStatus::Failed;
                record.finished_at = Some(Utc::now());
                record.error = Some("deadline exceeded before execution".to_string());
                if let Ok(mut conn) = self.store.connection().await {
                    let _ = self.queue.save(&mut conn, &record).await;
                }
                tracing::warn!(job_id = %record.id, "job dropped past its deadline");
                return;
            }
        }

        let mut conn = match self.store.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(subsystem = "queue", error = %e, "store unavailable, requeueing job");
                record.scheduled_time = Utc::now() + TimeDelta::seconds(1);
                let _ = self.queue.reschedule(&record).await;
                return;
            }
        };

        // Take the lease before anything else
        let lease = lease_key(&record.id);
        let lease_ok: Result<(), redis::RedisError> = async {
            let _: () = conn
                .set_ex(&lease, &self.id, self.config.lease_secs)
                .await?;
            let _: () = conn.sadd(INFLIGHT_KEY, &record.id).await?;
            Ok(())
        }
        .await;
        if let Err(e) = lease_ok {
            tracing::warn!(subsystem = "queue", job_id = %record.id, error = %e, "lease acquisition failed");
            return;
        }

        record.status = JobStatus::InFlight;
        record.attempt += 1;
        record.started_at = Some(Utc::now());
        if let Err(e) = self.queue.save(&mut conn, &record).await {
            tracing::warn!(subsystem = "queue", job_id = %record.id, error = %e, "job record save failed");
        }

        tracing::info!(
            job_id = %record.id,
            function = %record.function,
            attempt = record.attempt,
            "job started"
        );

        // Heartbeat extends the lease while the body runs
        let heartbeat = {
            let store = self.store.clone();
            let lease = lease.clone();
            let lease_secs = self.config.lease_secs;
            tokio::spawn(async move {
                let mut tick =
                    tokio::time::interval(Duration::from_secs((lease_secs / 2).max(1)));
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if let Ok(mut conn) = store.connection().await {
                        let _: Result<(), _> = conn.expire(&lease, lease_secs as i64).await;
                    }
                }
            })
        };

        let outcome = match self.registry.get(&record.function) {
            Some(handler) => {
                let ctx = JobContext {
                    job_id: record.id.clone(),
                    attempt: record.attempt,
                    pool: self.pool.clone(),
                    store: self.store.clone(),
                };
                match tokio::time::timeout(
                    self.config.job_timeout,
                    handler(ctx, record.args.clone()),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(JobError::failed(format!(
                        "timed out after {}s",
                        self.config.job_timeout.as_secs()
                    ))),
                }
            }
            None => Err(JobError::failed(format!(
                "unknown job function: {}",
                record.function
            ))),
        };

        heartbeat.abort();

        let release: Result<(), redis::RedisError> = async {
            let _: () = conn.del(&lease).await?;
            let _: () = conn.srem(INFLIGHT_KEY, &record.id).await?;
            Ok(())
        }
        .await;
        if let Err(e) = release {
            tracing::warn!(subsystem = "queue", job_id = %record.id, error = %e, "lease release failed");
        }

        match outcome {
            Ok(result) => {
                record.status = JobStatus::Succeeded;
                record.finished_at = Some(Utc::now());
                record.result = Some(result);
                record.error = None;
                if let Err(e) = self.queue.save(&mut conn, &record).await {
                    tracing::warn!(subsystem = "queue", job_id = %record.id, error = %e, "result save failed");
                }
                tracing::info!(job_id = %record.id, function = %record.function, "job succeeded");
            }
            Err(JobError::Failed(message)) => {
                self.handle_failure(&mut record, message).await;
            }
        }
    }

    async fn handle_failure(&self, record: &mut JobRecord, error: String) {
        record.error = Some(error.clone());

        if record.attempt >= record.max_tries {
            record.status = JobStatus::Dead;
            record.finished_at = Some(Utc::now());
            if let Ok(mut conn) = self.store.connection().await {
                let _ = self.queue.save(&mut conn, record).await;
            }
            tracing::error!(
                job_id = %record.id,
                function = %record.function,
                attempts = record.attempt,
                error = %error,
                "job exhausted its retries and is dead"
            );
            return;
        }

        let delay = retry_delay_secs(
            self.config.backoff_base_secs,
            record.attempt,
            self.config.backoff_ceiling_secs,
        );
        record.status = JobStatus::RetryScheduled;
        record.scheduled_time = Utc::now() + TimeDelta::seconds(delay as i64);

        if let Err(e) = self.queue.reschedule(record).await {
            tracing::warn!(subsystem = "queue", job_id = %record.id, error = %e, "retry reschedule failed");
            return;
        }
        tracing::warn!(
            job_id = %record.id,
            function = %record.function,
            attempt = record.attempt,
            retry_in_secs = delay,
            error = %error,
            "job failed, retry scheduled"
        );
    }

    /// Scan in-flight jobs and requeue those whose lease expired
    async fn reap_loop(&self) {
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.lease_secs.max(1)));
        loop {
            tick.tick().await;
            if let Err(e) = self.reap_once().await {
                tracing::warn!(subsystem = "queue", error = %e, "lease reaper pass failed");
            }
        }
    }

    async fn reap_once(&self) -> Result<(), AppError> {
        let mut conn = self.store.connection().await?;
        let inflight: Vec<String> = conn.smembers(INFLIGHT_KEY).await?;

        for id in inflight {
            let held: bool = conn.exists(lease_key(&id)).await?;
            if held {
                continue;
            }

            let _: () = conn.srem(INFLIGHT_KEY, &id).await?;
            let Some(mut record) = self.queue.load(&mut conn, &id).await? else {
                let _: () = conn.del(data_key(&id)).await?;
                continue;
            };
            if record.status != JobStatus::InFlight {
                continue;
            }

            if record.attempt >= record.max_tries {
                record.status = JobStatus::Dead;
                record.finished_at = Some(Utc::now());
                record.error = Some("lease expired with no attempts remaining".to_string());
                self.queue.save(&mut conn, &record).await?;
                tracing::error!(job_id = %id, "expired lease exhausted the job");
            } else {
                record.status = JobStatus::Queued;
                record.scheduled_time = Utc::now();
                self.queue.reschedule(&record).await?;
                tracing::warn!(
                    job_id = %id,
                    attempt = record.attempt,
                    "lease expired, job returned to the queue"
                );
            }
        }
        Ok(())
    }
}

/// Delay before the next attempt; `attempt` is the 1-indexed attempt
/// that just failed, so prior-retry count n = attempt - 1 and the delay
/// is `base * 2^n`, capped.
pub fn retry_delay_secs(base_secs: u64, attempt: u32, ceiling_secs: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(30);
    base_secs
        .saturating_mul(1u64 << exponent)
        .min(ceiling_secs.max(base_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_per_attempt() {
        assert_eq!(retry_delay_secs(5, 1, 3600), 5);
        assert_eq!(retry_delay_secs(5, 2, 3600), 10);
        assert_eq!(retry_delay_secs(5, 3, 3600), 20);
    }

    #[test]
    fn test_retry_delay_caps_at_ceiling() {
        assert_eq!(retry_delay_secs(5, 20, 3600), 3600);
        assert_eq!(retry_delay_secs(5000, 1, 3600), 5000);
    }

    #[test]
    fn test_registry_dispatches_by_name() {
        let mut registry = JobRegistry::new();
        registry.register("noop", |_ctx, args| async move { Ok(args) });
        assert!(registry.get("noop").is_some());
        assert!(registry.get("other").is_none());
    }
}
