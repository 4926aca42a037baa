/**
 * Router Configuration
 *
 * Combines every route group into the application router and applies
 * the middleware stack.
 *
 * # Route Groups
 *
 * 1. Welcome and health probes
 * 2. Resource kinds (`/users`, `/media`) via the generic route group
 * 3. WebSocket fabric (`/ws/{channel}`, `/ws/stats`)
 * 4. Webhook management (`/webhooks/...`)
 * 5. Task submission and polling (`/tasks/...`)
 *
 * The rate-limit middleware wraps the whole router; excluded paths are
 * handled inside the middleware itself.
 */

use axum::{
    middleware,
    routing::{delete, get, post},
    Json, Router,
};

use crate::middleware::rate_limit::rate_limit_middleware;
use crate::models::{MediaAdapter, UserAdapter};
use crate::routes::resources::resource_routes;
use crate::routes::{tasks, webhooks, ws};
use crate::server::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let app_name = state.settings.app_name.clone();

    let webhook_routes = Router::new()
        .route(
            "/subscriptions",
            post(webhooks::create_subscription).get(webhooks::list_subscriptions),
        )
        .route(
            "/subscriptions/{id}",
            get(webhooks::get_subscription)
                .patch(webhooks::update_subscription)
                .delete(webhooks::delete_subscription),
        )
        .route("/subscriptions/{id}/stats", get(webhooks::subscription_stats))
        .route("/deliveries", get(webhooks::list_deliveries))
        .route("/events", get(webhooks::list_events))
        .route("/test", post(webhooks::test_webhook));

    let task_routes = Router::new()
        .route("/media/process", post(tasks::submit_process_media))
        .route("/media/thumbnail", post(tasks::submit_thumbnail))
        .route("/email/send", post(tasks::submit_email))
        .route("/email/bulk", post(tasks::submit_bulk_email))
        .route("/{id}/status", get(tasks::task_status))
        .route("/{id}", delete(tasks::remove_task));

    Router::new()
        .route(
            "/",
            get(move || {
                let app_name = app_name.clone();
                async move {
                    Json(serde_json::json!({
                        "name": app_name,
                        "version": env!("CARGO_PKG_VERSION"),
                        "docs": "/webhooks/events for the event catalog, /ws/{channel} for realtime",
                    }))
                }
            }),
        )
        .route("/health", get(|| async { Json(serde_json::json!({"status": "ok"})) }))
        .nest("/users", resource_routes::<UserAdapter>())
        .nest("/media", resource_routes::<MediaAdapter>())
        .route("/ws/stats", get(ws::ws_stats))
        .route("/ws/{channel}", get(ws::ws_handler))
        .nest("/webhooks", webhook_routes)
        .nest("/tasks", task_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}
