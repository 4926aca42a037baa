/**
 * Webhook Routes
 *
 * Subscription CRUD, the event catalog, the delivery audit trail, and
 * the synchronous one-shot test endpoint.
 */

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::webhook::{
    SubscriptionCreate, SubscriptionStats, SubscriptionUpdate, WebhookDelivery,
    WebhookSubscription,
};
use crate::webhooks::{WebhookService, WebhookTestResult, EVENT_CATALOG};

/// `POST /webhooks/subscriptions`
pub async fn create_subscription(
    State(service): State<Arc<WebhookService>>,
    Json(input): Json<SubscriptionCreate>,
) -> Result<(StatusCode, Json<WebhookSubscription>), AppError> {
    let subscription = service.create_subscription(input).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsParams {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub event: Option<String>,
}

/// `GET /webhooks/subscriptions`
pub async fn list_subscriptions(
    State(service): State<Arc<WebhookService>>,
    Query(params): Query<ListSubscriptionsParams>,
) -> Result<Json<Vec<WebhookSubscription>>, AppError> {
    let subscriptions = service
        .list_subscriptions(params.active_only, params.event.as_deref())
        .await?;
    Ok(Json(subscriptions))
}

/// `GET /webhooks/subscriptions/{id}`
pub async fn get_subscription(
    State(service): State<Arc<WebhookService>>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookSubscription>, AppError> {
    let subscription = service
        .get_subscription(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("webhooks/subscriptions/{id}")))?;
    Ok(Json(subscription))
}

/// `PATCH /webhooks/subscriptions/{id}`
pub async fn update_subscription(
    State(service): State<Arc<WebhookService>>,
    Path(id): Path<i64>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<WebhookSubscription>, AppError> {
    let subscription = service
        .update_subscription(id, update)
        .await?
        .ok_or_else(|| AppError::not_found(format!("webhooks/subscriptions/{id}")))?;
    Ok(Json(subscription))
}

/// `DELETE /webhooks/subscriptions/{id}`
pub async fn delete_subscription(
    State(service): State<Arc<WebhookService>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if service.delete_subscription(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("webhooks/subscriptions/{id}")))
    }
}

/// `GET /webhooks/subscriptions/{id}/stats`
pub async fn subscription_stats(
    State(service): State<Arc<WebhookService>>,
    Path(id): Path<i64>,
) -> Result<Json<SubscriptionStats>, AppError> {
    let subscription = service
        .get_subscription(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("webhooks/subscriptions/{id}")))?;
    Ok(Json(subscription.stats()))
}

#[derive(Debug, Deserialize)]
pub struct ListDeliveriesParams {
    #[serde(default)]
    pub subscription_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default = "default_deliveries_limit")]
    pub limit: i64,
}

fn default_deliveries_limit() -> i64 {
    100
}

/// `GET /webhooks/deliveries`
pub async fn list_deliveries(
    State(service): State<Arc<WebhookService>>,
    Query(params): Query<ListDeliveriesParams>,
) -> Result<Json<Vec<WebhookDelivery>>, AppError> {
    let deliveries = service
        .get_deliveries(
            params.subscription_id,
            params.event_type.as_deref(),
            params.success,
            params.limit,
        )
        .await?;
    Ok(Json(deliveries))
}

/// `GET /webhooks/events` lists the registered catalog
pub async fn list_events() -> Json<Vec<&'static str>> {
    Json(EVENT_CATALOG.to_vec())
}

#[derive(Debug, Deserialize)]
pub struct TestWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default = "default_test_timeout")]
    pub timeout_secs: u64,
}

fn default_test_timeout() -> u64 {
    10
}

/// `POST /webhooks/test`: synchronous single-shot delivery, no durable
/// subscription created
pub async fn test_webhook(
    State(service): State<Arc<WebhookService>>,
    Json(request): Json<TestWebhookRequest>,
) -> Result<Json<WebhookTestResult>, AppError> {
    if !(request.url.starts_with("https://") || request.url.starts_with("http://")) {
        return Err(AppError::validation("url", "must be an http(s) URL"));
    }
    let result = service
        .test_url(&request.url, request.headers.as_ref(), request.timeout_secs)
        .await;
    Ok(Json(result))
}
