/**
 * Sliding-Window Rate Limiter
 *
 * Admission control per `(identity, endpoint class)` pair, backed by
 * sorted sets in the shared store. Each admitted request records a
 * timestamped member under `rate_limit:<key>`; a check prunes entries
 * older than the window, counts survivors, and inserts only when the
 * count is below the limit, so denied requests never consume window
 * slots.
 *
 * # Failure Policy
 *
 * The limiter is protective, not authoritative: when the store is
 * disabled or unreachable it fails open, admitting the request after a
 * structured warning.
 */

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::SharedStore;

/// Outcome of an admission check
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds when the window fully resets
    pub reset_at: i64,
    pub current_usage: u64,
    /// Seconds until the oldest entry expires; 0 when allowed
    pub retry_after: i64,
}

impl RateLimitDecision {
    fn open(limit: u64, window_secs: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset_at: Utc::now().timestamp() + window_secs as i64,
            current_usage: 0,
            retry_after: 0,
        }
    }
}

/// Store-backed sliding-window limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: SharedStore,
}

impl RateLimiter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Check and (when admitted) record one request for `key`.
    ///
    /// Fails open on store trouble.
    pub async fn check(&self, key: &str, limit: u64, window_secs: u64) -> RateLimitDecision {
        if !self.store.is_enabled() {
            return RateLimitDecision::open(limit, window_secs);
        }

        match self.check_inner(key, limit, window_secs).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    subsystem = "rate_limit",
                    key,
                    error = %e,
                    "store unavailable, failing open"
                );
                RateLimitDecision::open(limit, window_secs)
            }
        }
    }

    async fn check_inner(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<RateLimitDecision, AppError> {
        let mut conn = self.store.connection().await?;
        let store_key = format!("rate_limit:{key}");
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = window_secs as i64 * 1000;

        // Prune and count atomically
        let (_removed, count): (i64, u64) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&store_key)
            .arg("-inf")
            .arg(now_ms - window_ms)
            .cmd("ZCARD")
            .arg(&store_key)
            .query_async(&mut conn)
            .await?;

        let reset_at = (now_ms + window_ms) / 1000;

        if count < limit {
            // Unique member per request; identical-millisecond requests
            // must not collapse into one entry
            let member = format!("{}:{}", now_ms, Uuid::new_v4().simple());
            let _: () = redis::pipe()
                .atomic()
                .cmd("ZADD")
                .arg(&store_key)
                .arg(now_ms)
                .arg(&member)
                .ignore()
                .cmd("EXPIRE")
                .arg(&store_key)
                .arg(window_secs + 10)
                .ignore()
                .query_async(&mut conn)
                .await?;

            return Ok(RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - count - 1,
                reset_at,
                current_usage: count + 1,
                retry_after: 0,
            });
        }

        // Denied: report when the oldest surviving entry leaves the window
        let oldest: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(&store_key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        let retry_after = oldest
            .first()
            .map(|(_, score)| ((*score as i64 + window_ms - now_ms) + 999) / 1000)
            .unwrap_or(window_secs as i64)
            .max(0);

        Ok(RateLimitDecision {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            current_usage: count,
            retry_after,
        })
    }

    /// Clear one window (admin override, tests)
    pub async fn reset(&self, key: &str) -> Result<(), AppError> {
        if !self.store.is_enabled() {
            return Ok(());
        }
        let mut conn = self.store.connection().await?;
        let _: () = redis::cmd("DEL")
            .arg(format!("rate_limit:{key}"))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_store_fails_open() {
        let limiter = RateLimiter::new(SharedStore::disabled());
        let decision = limiter.check("ip:10.0.0.1:/users/", 5, 60).await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 5);
        assert_eq!(decision.retry_after, 0);
    }
}
