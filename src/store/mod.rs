//! Shared Store Module
//!
//! One Redis-backed store is shared by four consumers: the job queue,
//! the rate limiter, the pub/sub progress fabric, and the read-through
//! cache. This module owns the client handle; each consumer issues its
//! own commands over cheap multiplexed connections.
//!
//! The store is optional: when `REDIS_ENABLED=false` every consumer
//! degrades (cache misses, rate limiter fails open, queue submission
//! errors surface as 503).

pub mod cache;

pub use cache::Cache;

use redis::aio::MultiplexedConnection;

use crate::error::AppError;

/// Handle to the shared key-value store.
///
/// Cloning is cheap; all clones share the underlying client.
#[derive(Clone)]
pub struct SharedStore {
    client: Option<redis::Client>,
}

impl SharedStore {
    /// Create a store handle from a Redis URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is malformed. Connectivity is not
    /// checked here; connections are established lazily per consumer.
    pub fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disabled store; every connection attempt reports
    /// unavailability.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Whether a backing client is configured
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Get a multiplexed connection for issuing commands.
    ///
    /// # Errors
    ///
    /// `AppError::Store` when the store is disabled or unreachable.
    pub async fn connection(&self) -> Result<MultiplexedConnection, AppError> {
        match &self.client {
            Some(client) => Ok(client.get_multiplexed_async_connection().await?),
            None => Err(AppError::internal("shared store is disabled")),
        }
    }

    /// Get a dedicated pub/sub connection (psubscribe support).
    ///
    /// Pub/sub requires its own connection; the multiplexed handle cannot
    /// enter subscriber mode.
    pub async fn pubsub(&self) -> Result<redis::aio::PubSub, AppError> {
        match &self.client {
            Some(client) => Ok(client.get_async_pubsub().await?),
            None => Err(AppError::internal("shared store is disabled")),
        }
    }

    /// Publish a JSON payload to a pub/sub subject.
    ///
    /// All pub/sub messages are JSON; no other encoding is permitted.
    pub async fn publish(&self, subject: &str, payload: &serde_json::Value) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(payload)?;
        let _: () = redis::cmd("PUBLISH")
            .arg(subject)
            .arg(body)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
