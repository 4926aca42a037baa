/**
 * Read-Through Cache
 *
 * Caches query results in the shared store so hot reads skip the
 * database. Keys are namespaced by resource kind (`users:id:7`,
 * `users:filter:ab12cd34`), which makes invalidation a single pattern
 * delete: any mutation of a kind drops every `<kind>:*` key.
 *
 * # Failure Policy
 *
 * The cache is protective, not authoritative. Every operation swallows
 * store errors after a structured warning and behaves as a miss; callers
 * always fall back to the database.
 */

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::SharedStore;

/// Cache handle bound to a TTL; cloneable and cheap
#[derive(Clone)]
pub struct Cache {
    store: SharedStore,
    ttl_secs: u64,
}

impl Cache {
    pub fn new(store: SharedStore, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    /// Fetch a cached value, or `None` on miss, decode failure, or store
    /// trouble.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.store.is_enabled() {
            return None;
        }

        let mut conn = match self.store.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(subsystem = "cache", key, error = %e, "cache unavailable, falling back to database");
                return None;
            }
        };

        let raw: Option<String> = match redis::cmd("GET").arg(key).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(subsystem = "cache", key, error = %e, "cache read failed");
                return None;
            }
        };

        raw.and_then(|body| match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(subsystem = "cache", key, error = %e, "cached value did not decode, ignoring");
                None
            }
        })
    }

    /// Store a value under `key` with the configured TTL. Best effort.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        if !self.store.is_enabled() {
            return;
        }

        let body = match serde_json::to_string(value) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(subsystem = "cache", key, error = %e, "value not cacheable");
                return;
            }
        };

        let result: Result<(), _> = async {
            let mut conn = self.store.connection().await?;
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(body)
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async(&mut conn)
                .await?;
            Ok::<(), crate::error::AppError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(subsystem = "cache", key, error = %e, "cache write failed");
        }
    }

    /// Delete every key matching `<prefix>:*`.
    ///
    /// Uses SCAN rather than KEYS so a large keyspace does not stall the
    /// store. Best effort.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        if !self.store.is_enabled() {
            return;
        }

        let pattern = format!("{prefix}:*");
        let result: Result<u64, _> = async {
            let mut conn = self.store.connection().await?;
            let mut cursor: u64 = 0;
            let mut deleted: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                if !keys.is_empty() {
                    let removed: u64 = redis::cmd("DEL")
                        .arg(&keys)
                        .query_async(&mut conn)
                        .await?;
                    deleted += removed;
                }
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok::<u64, crate::error::AppError>(deleted)
        }
        .await;

        match result {
            Ok(deleted) if deleted > 0 => {
                tracing::debug!(subsystem = "cache", prefix, deleted, "cache invalidated");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(subsystem = "cache", prefix, error = %e, "cache invalidation failed");
            }
        }
    }
}
