/**
 * Server Initialization
 *
 * Builds every component in dependency order (store and database first,
 * then queue and fabric, then the engines, then the limiter), runs
 * migrations, and assembles the router. Background tasks (worker, lease
 * reaper, notification bridge) are spawned separately so tests can
 * construct the app without them.
 *
 * # Failure Policy
 *
 * An unreachable database or a migration mismatch is fatal; the caller
 * exits non-zero. A disabled store is not: the server runs with cache
 * misses, an open rate limiter, and queue submission errors surfaced as
 * 503s.
 */

use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;

use crate::channels::{Channel, ConnectionManager};
use crate::config::Settings;
use crate::error::AppError;
use crate::jobs::{self, JobDependencies, LogMailer, PassthroughProcessor};
use crate::models::{MediaAdapter, UserAdapter};
use crate::queue::{JobQueue, JobRegistry, NotificationBridge, Worker, WorkerConfig};
use crate::rate_limit::RateLimiter;
use crate::resource::ResourceService;
use crate::routes::create_router;
use crate::server::state::AppState;
use crate::store::{Cache, SharedStore};
use crate::webhooks::WebhookService;

/// Channels the fabric serves: one per kind plus task notifications
pub const REGISTERED_CHANNELS: &[&str] = &["users", "media", "tasks"];

/// Construct the application: pool, migrations, components, router.
pub async fn create_app(settings: Settings) -> Result<(Router, AppState), AppError> {
    tracing::info!("Initializing {} server", settings.app_name);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations");
    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| AppError::internal(format!("migration failed: {e}")))?;

    let store = if settings.redis_enabled {
        match SharedStore::connect(&settings.redis_url()) {
            Ok(store) => {
                tracing::info!(
                    host = %settings.redis_host,
                    port = settings.redis_port,
                    "Shared store configured"
                );
                store
            }
            Err(e) => {
                tracing::warn!(error = %e, "Shared store misconfigured; continuing without it");
                SharedStore::disabled()
            }
        }
    } else {
        tracing::warn!("Shared store disabled; cache, queue, and rate limiting degraded");
        SharedStore::disabled()
    };

    let cache = Cache::new(store.clone(), settings.cache_ttl_secs);
    let manager = Arc::new(ConnectionManager::new(
        REGISTERED_CHANNELS.iter().map(|c| c.to_string()),
        settings.ws_client_queue_depth,
    ));

    let queue = Arc::new(JobQueue::new(
        store.clone(),
        settings.job_max_tries,
        settings.job_result_ttl_secs,
    ));
    let webhooks = Arc::new(WebhookService::new(
        pool.clone(),
        queue.clone(),
        settings.app_name.clone(),
        settings.job_backoff_ceiling_secs,
    ));

    let users = Arc::new(ResourceService::new(
        UserAdapter,
        pool.clone(),
        Channel::new("users", manager.clone()),
        webhooks.clone(),
        cache.clone(),
    ));
    let media = Arc::new(ResourceService::new(
        MediaAdapter::new(settings.max_file_size),
        pool.clone(),
        Channel::new("media", manager.clone()),
        webhooks.clone(),
        cache.clone(),
    ));

    let limiter = Arc::new(RateLimiter::new(store.clone()));

    let state = AppState {
        settings: Arc::new(settings),
        pool,
        store,
        manager,
        users,
        media,
        webhooks,
        queue,
        limiter,
    };

    let router = create_router(state.clone());
    tracing::info!("Router configured");
    Ok((router, state))
}

/// Spawn the embedded worker and the task-notification bridge.
pub fn spawn_background_tasks(state: &AppState) {
    let settings = state.settings.clone();

    if settings.worker_enabled && state.store.is_enabled() {
        let mut registry = JobRegistry::new();
        jobs::register_builtin(
            &mut registry,
            JobDependencies {
                queue: state.queue.clone(),
                webhooks: state.webhooks.clone(),
                mailer: Arc::new(LogMailer::new(
                    settings.smtp_from_email.clone(),
                    settings.smtp_from_name.clone(),
                )),
                processor: Arc::new(PassthroughProcessor),
            },
        );

        let worker = Arc::new(Worker::new(
            state.queue.clone(),
            registry,
            state.store.clone(),
            state.pool.clone(),
            WorkerConfig {
                concurrency: settings.worker_concurrency,
                job_timeout: std::time::Duration::from_secs(settings.job_timeout_secs),
                lease_secs: settings.job_lease_secs,
                backoff_base_secs: settings.job_backoff_base_secs,
                backoff_ceiling_secs: settings.job_backoff_ceiling_secs,
                poll_interval: std::time::Duration::from_millis(500),
            },
        ));
        tokio::spawn(worker.run());
    } else {
        tracing::warn!("Embedded worker not started (disabled or store unavailable)");
    }

    let bridge = NotificationBridge::new(state.store.clone(), state.manager.clone());
    tokio::spawn(bridge.run());
}
