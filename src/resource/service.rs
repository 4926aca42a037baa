/**
 * Generic Resource Service
 *
 * One `ResourceService<A>` per registered kind implements the full
 * operation set: CRUD, counting, advanced filtering, and pagination,
 * with automatic fan-out on every successful mutation.
 *
 * # Fan-Out
 *
 * A mutation commits first, then (unless suppressed) the output shape is
 * broadcast on the kind's channel and handed to the webhook dispatcher
 * as `<prefix>.created|updated|deleted`. Fan-out failure never rolls the
 * commit back; it is logged as a structured warning.
 *
 * # Caching
 *
 * Read operations consult the shared-store cache first and populate it
 * on miss; every mutation invalidates the kind's whole key prefix.
 * Cache trouble falls back to the database transparently.
 */

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};

use crate::channels::Channel;
use crate::error::AppError;
use crate::resource::adapter::ResourceAdapter;
use crate::resource::filters::{self, QueryFilter, MAX_LIMIT};
use crate::store::Cache;
use crate::webhooks::WebhookService;

/// A page of results with pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// Generic CRUD + filtering engine bound to one kind
pub struct ResourceService<A: ResourceAdapter> {
    adapter: A,
    pool: PgPool,
    channel: Channel,
    webhooks: Arc<WebhookService>,
    cache: Cache,
}

impl<A: ResourceAdapter> ResourceService<A> {
    /// Bind an adapter to its collaborators. The channel is injected
    /// here, once, so kind services never import fabric internals.
    pub fn new(
        adapter: A,
        pool: PgPool,
        channel: Channel,
        webhooks: Arc<WebhookService>,
        cache: Cache,
    ) -> Self {
        Self {
            adapter,
            pool,
            channel,
            webhooks,
            cache,
        }
    }

    /// The kind this service manages
    pub fn kind(&self) -> &'static str {
        self.adapter.kind()
    }

    /// Fetch one instance by id
    pub async fn get_by_id(&self, id: i64) -> Result<Option<A::Output>, AppError> {
        let cache_key = format!("{}:id:{}", self.kind(), id);
        if let Some(hit) = self.cache.get::<A::Output>(&cache_key).await {
            return Ok(Some(hit));
        }

        let query = format!("SELECT * FROM {} WHERE id = $1", self.kind());
        let row: Option<A::Stored> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let output = row.map(|stored| self.adapter.project(stored));
        if let Some(output) = &output {
            self.cache.set(&cache_key, output).await;
        }
        Ok(output)
    }

    /// List a page of instances ordered by id
    pub async fn get_all(&self, skip: i64, limit: i64) -> Result<Vec<A::Output>, AppError> {
        validate_page(skip, limit)?;

        let cache_key = format!("{}:list:{}:{}", self.kind(), skip, limit);
        if let Some(hit) = self.cache.get::<Vec<A::Output>>(&cache_key).await {
            return Ok(hit);
        }

        let query = format!(
            "SELECT * FROM {} ORDER BY id ASC LIMIT $1 OFFSET $2",
            self.kind()
        );
        let rows: Vec<A::Stored> = sqlx::query_as(&query)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await?;

        let outputs: Vec<A::Output> = rows
            .into_iter()
            .map(|stored| self.adapter.project(stored))
            .collect();
        self.cache.set(&cache_key, &outputs).await;
        Ok(outputs)
    }

    /// List a page with full pagination metadata
    pub async fn get_all_paginated(
        &self,
        skip: i64,
        limit: i64,
    ) -> Result<Paginated<A::Output>, AppError> {
        validate_page(skip, limit)?;

        let total = self.count().await?;
        let data = self.get_all(skip, limit).await?;
        let has_more = skip + (data.len() as i64) < total;
        Ok(Paginated {
            data,
            total,
            limit,
            offset: skip,
            has_more,
        })
    }

    /// Create an instance; broadcasts and emits `<prefix>.created` unless
    /// `broadcast` is false (bulk imports, tests).
    pub async fn create(&self, input: A::Input, broadcast: bool) -> Result<A::Output, AppError> {
        self.adapter.validate_input(&input)?;

        let values = self.adapter.insert_values(&input);
        if values.is_empty() {
            return Err(AppError::validation("body", "no fields supplied"));
        }

        let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", self.kind()));
        for (i, (column, _)) in values.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(*column);
        }
        qb.push(") VALUES (");
        for (i, (_, value)) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            value.push(&mut qb);
        }
        qb.push(") RETURNING *");

        let stored: A::Stored = qb.build_query_as().fetch_one(&self.pool).await?;
        self.cache.invalidate_prefix(self.kind()).await;

        let output = self.adapter.project(stored);
        self.fan_out("created", &output, broadcast).await;
        Ok(output)
    }

    /// Apply a partial update; only supplied fields change and
    /// `updated_at` is bumped. Returns `None` when the id is unknown.
    pub async fn update(
        &self,
        id: i64,
        update: A::Update,
        broadcast: bool,
    ) -> Result<Option<A::Output>, AppError> {
        self.adapter.validate_update(&update)?;

        let values = self.adapter.update_values(&update);
        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", self.kind()));
        for (column, value) in values {
            qb.push(column);
            qb.push(" = ");
            value.push(&mut qb);
            qb.push(", ");
        }
        qb.push("updated_at = NOW() WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING *");

        let stored: Option<A::Stored> = qb.build_query_as().fetch_optional(&self.pool).await?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        self.cache.invalidate_prefix(self.kind()).await;

        let output = self.adapter.project(stored);
        self.fan_out("updated", &output, broadcast).await;
        Ok(Some(output))
    }

    /// Delete by id; returns whether anything was deleted. The `deleted`
    /// event carries only the id.
    pub async fn delete(&self, id: i64, broadcast: bool) -> Result<bool, AppError> {
        let query = format!("DELETE FROM {} WHERE id = $1 RETURNING id", self.kind());
        let deleted: Option<(i64,)> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        if deleted.is_none() {
            return Ok(false);
        }

        self.cache.invalidate_prefix(self.kind()).await;

        if broadcast {
            self.channel.broadcast_deleted(id).await;
            let event = format!("{}.deleted", self.adapter.event_prefix());
            self.dispatch_webhook(&event, serde_json::json!({ "id": id }))
                .await;
        }
        Ok(true)
    }

    /// Total instance count
    pub async fn count(&self) -> Result<i64, AppError> {
        let query = format!("SELECT COUNT(*) FROM {}", self.kind());
        let total: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(total)
    }

    /// Run a structured query and return the matching page
    pub async fn filter(&self, filter: &QueryFilter) -> Result<Vec<A::Output>, AppError> {
        filter.validate()?;

        let cache_key = format!("{}:filter:{}", self.kind(), filter.cache_hash());
        if let Some(hit) = self.cache.get::<Vec<A::Output>>(&cache_key).await {
            return Ok(hit);
        }

        let columns = self.adapter.columns();
        let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", self.kind()));
        filters::push_where_clause(&mut qb, filter, columns);
        filters::push_order_clause(&mut qb, filter, columns);
        filters::push_pagination(&mut qb, filter);

        let rows: Vec<A::Stored> = qb.build_query_as().fetch_all(&self.pool).await?;
        let outputs: Vec<A::Output> = rows
            .into_iter()
            .map(|stored| self.adapter.project(stored))
            .collect();
        self.cache.set(&cache_key, &outputs).await;
        Ok(outputs)
    }

    /// Count instances matching a query's conditions (pagination ignored)
    pub async fn count_filtered(&self, filter: &QueryFilter) -> Result<i64, AppError> {
        filter.validate()?;

        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.kind()));
        filters::push_where_clause(&mut qb, filter, self.adapter.columns());
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }

    /// Run a structured query and return the page plus metadata
    pub async fn filter_paginated(
        &self,
        filter: &QueryFilter,
    ) -> Result<Paginated<A::Output>, AppError> {
        filter.validate()?;

        let cache_key = format!("{}:filter:paginated:{}", self.kind(), filter.cache_hash());
        if let Some(hit) = self.cache.get::<Paginated<A::Output>>(&cache_key).await {
            return Ok(hit);
        }

        let total = self.count_filtered(filter).await?;
        let data = self.filter(filter).await?;
        let offset = filter.effective_offset();
        let page = Paginated {
            has_more: offset + (data.len() as i64) < total,
            total,
            limit: filter.effective_limit(),
            offset,
            data,
        };
        self.cache.set(&cache_key, &page).await;
        Ok(page)
    }

    async fn fan_out(&self, action: &str, output: &A::Output, broadcast: bool) {
        if !broadcast {
            return;
        }

        let data = match serde_json::to_value(output) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    subsystem = "channels",
                    channel = self.kind(),
                    error = %e,
                    "output shape did not serialize, skipping fan-out"
                );
                return;
            }
        };

        match action {
            "created" => self.channel.broadcast_created(data.clone()).await,
            _ => self.channel.broadcast_updated(data.clone()).await,
        };

        let event = format!("{}.{}", self.adapter.event_prefix(), action);
        self.dispatch_webhook(&event, data).await;
    }

    async fn dispatch_webhook(&self, event: &str, data: serde_json::Value) {
        if let Err(e) = self.webhooks.trigger_event(event, data).await {
            tracing::warn!(
                subsystem = "webhooks",
                event,
                error = %e,
                "webhook dispatch failed, mutation unaffected"
            );
        }
    }
}

fn validate_page(skip: i64, limit: i64) -> Result<(), AppError> {
    if skip < 0 {
        return Err(AppError::validation("skip", "must be >= 0"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::validation(
            "limit",
            format!("must be between 1 and {MAX_LIMIT}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_validation() {
        assert!(validate_page(0, 100).is_ok());
        assert!(validate_page(0, MAX_LIMIT).is_ok());
        assert!(validate_page(-1, 100).is_err());
        assert!(validate_page(0, 0).is_err());
        assert!(validate_page(0, MAX_LIMIT + 1).is_err());
    }

    #[test]
    fn test_paginated_serialization_shape() {
        let page = Paginated {
            data: vec![1, 2, 3],
            total: 10,
            limit: 3,
            offset: 0,
            has_more: true,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["total"], 10);
        assert_eq!(json["has_more"], true);
        assert_eq!(json["data"].as_array().unwrap().len(), 3);
    }
}
