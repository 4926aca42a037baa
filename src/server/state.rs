/**
 * Application State Management
 *
 * This module defines the application state structure and implements
 * the `FromRef` traits for Axum state extraction.
 *
 * # Architecture
 *
 * `AppState` is the central container: every component is constructed
 * once at startup and threaded through handlers explicitly. There are
 * no ambient singletons; a handler declares exactly the piece of state
 * it needs via `FromRef`.
 *
 * # Thread Safety
 *
 * Every member is either `Clone`-cheap (pools, store handles) or
 * wrapped in `Arc`.
 */

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::channels::ConnectionManager;
use crate::config::Settings;
use crate::models::{MediaAdapter, UserAdapter};
use crate::queue::JobQueue;
use crate::rate_limit::RateLimiter;
use crate::resource::ResourceService;
use crate::store::SharedStore;
use crate::webhooks::WebhookService;

/// Central state container shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: PgPool,
    pub store: SharedStore,
    pub manager: Arc<ConnectionManager>,
    pub users: Arc<ResourceService<UserAdapter>>,
    pub media: Arc<ResourceService<MediaAdapter>>,
    pub webhooks: Arc<WebhookService>,
    pub queue: Arc<JobQueue>,
    pub limiter: Arc<RateLimiter>,
}

impl FromRef<AppState> for Arc<ResourceService<UserAdapter>> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

impl FromRef<AppState> for Arc<ResourceService<MediaAdapter>> {
    fn from_ref(state: &AppState) -> Self {
        state.media.clone()
    }
}

impl FromRef<AppState> for Arc<ConnectionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.manager.clone()
    }
}

impl FromRef<AppState> for Arc<WebhookService> {
    fn from_ref(state: &AppState) -> Self {
        state.webhooks.clone()
    }
}

impl FromRef<AppState> for Arc<JobQueue> {
    fn from_ref(state: &AppState) -> Self {
        state.queue.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.limiter.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
