/**
 * Rate Limiting Middleware
 *
 * Global admission gate applied to the whole router. Identity defaults
 * to the source IP (honoring the first `X-Forwarded-For` hop); the
 * endpoint class is the request path, with per-prefix overrides for
 * heavy endpoints and an exclusion list for health and WebSocket
 * upgrades.
 *
 * Admitted responses carry `X-RateLimit-Limit` / `-Remaining` /
 * `-Reset`; denials are 429 with a machine-readable body and
 * `Retry-After`.
 */

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::rate_limit::RateLimitDecision;
use crate::server::state::AppState;

/// Axum middleware entry point; wire with `middleware::from_fn_with_state`
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state
        .settings
        .rate_limit_excluded_paths()
        .iter()
        .any(|excluded| path == *excluded || path.starts_with(&format!("{excluded}/")))
    {
        return next.run(request).await;
    }

    let identity = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string());

    let (limit, window) = limit_for_path(&state, &path);
    let key = format!("ip:{identity}:{path}");

    let decision = state.limiter.check(&key, limit, window).await;

    if !decision.allowed {
        tracing::warn!(
            subsystem = "rate_limit",
            identity = %identity,
            path = %path,
            limit,
            "rate limit exceeded"
        );
        return denial_response(&decision, limit, window);
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, &decision);
    response
}

fn limit_for_path(state: &AppState, path: &str) -> (u64, u64) {
    let overrides = state.settings.rate_limit_overrides();

    if let Some(limits) = overrides.get(path) {
        return *limits;
    }
    // Longest matching prefix wins so /tasks/email/bulk beats /tasks/
    let mut best: Option<(&str, (u64, u64))> = None;
    for (prefix, limits) in &overrides {
        if path.starts_with(*prefix) {
            match best {
                Some((current, _)) if current.len() >= prefix.len() => {}
                _ => best = Some((*prefix, *limits)),
            }
        }
    }
    best.map(|(_, limits)| limits).unwrap_or((
        state.settings.rate_limit_default,
        state.settings.rate_limit_window_secs,
    ))
}

fn denial_response(decision: &RateLimitDecision, limit: u64, window: u64) -> Response {
    let body = serde_json::json!({
        "error": "rate_limit_exceeded",
        "message": format!("Too many requests. Limit: {limit} requests per {window} seconds"),
        "limit": decision.limit,
        "current_usage": decision.current_usage,
        "retry_after": decision.retry_after,
        "reset_at": decision.reset_at,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    apply_headers(&mut response, decision);
    if let Ok(value) = HeaderValue::from_str(&decision.retry_after.to_string()) {
        response.headers_mut().insert("Retry-After", value);
    }
    response
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    let pairs = [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_at.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
