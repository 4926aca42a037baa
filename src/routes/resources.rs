/**
 * Generic Resource Routes
 *
 * One route group per registered kind, all backed by the same generic
 * handlers; declaring a new kind in the router is a single
 * `nest("/posts", resource_routes::<PostAdapter>())` line. CRUD code is
 * never duplicated per kind.
 */

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::resource::filters::DEFAULT_LIMIT;
use crate::resource::{Paginated, QueryFilter, ResourceAdapter, ResourceService};
use crate::server::state::AppState;

/// Query parameters for plain listings
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Build the route group for one kind
pub fn resource_routes<A>() -> Router<AppState>
where
    A: ResourceAdapter,
    Arc<ResourceService<A>>: FromRef<AppState>,
{
    Router::new()
        .route("/", get(list::<A>).post(create::<A>))
        .route("/paginated", get(list_paginated::<A>))
        .route("/filter", post(filter::<A>))
        .route("/filter/paginated", post(filter_paginated::<A>))
        .route(
            "/{id}",
            get(get_one::<A>)
                .patch(update::<A>)
                .delete(delete_one::<A>),
        )
}

async fn list<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<A::Output>>, AppError>
where
    A: ResourceAdapter,
{
    let items = service.get_all(params.skip, params.limit).await?;
    Ok(Json(items))
}

async fn list_paginated<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Paginated<A::Output>>, AppError>
where
    A: ResourceAdapter,
{
    let page = service.get_all_paginated(params.skip, params.limit).await?;
    Ok(Json(page))
}

async fn get_one<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Path(id): Path<i64>,
) -> Result<Json<A::Output>, AppError>
where
    A: ResourceAdapter,
{
    let item = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{}/{}", service.kind(), id)))?;
    Ok(Json(item))
}

async fn create<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Json(input): Json<A::Input>,
) -> Result<(StatusCode, Json<A::Output>), AppError>
where
    A: ResourceAdapter,
{
    let created = service.create(input, true).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Path(id): Path<i64>,
    Json(patch): Json<A::Update>,
) -> Result<Json<A::Output>, AppError>
where
    A: ResourceAdapter,
{
    let updated = service
        .update(id, patch, true)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{}/{}", service.kind(), id)))?;
    Ok(Json(updated))
}

async fn delete_one<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError>
where
    A: ResourceAdapter,
{
    let deleted = service.delete(id, true).await?;
    if !deleted {
        return Err(AppError::not_found(format!("{}/{}", service.kind(), id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn filter<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Json(query): Json<QueryFilter>,
) -> Result<Json<Vec<A::Output>>, AppError>
where
    A: ResourceAdapter,
{
    let items = service.filter(&query).await?;
    Ok(Json(items))
}

async fn filter_paginated<A>(
    State(service): State<Arc<ResourceService<A>>>,
    Json(query): Json<QueryFilter>,
) -> Result<Json<Paginated<A::Output>>, AppError>
where
    A: ResourceAdapter,
{
    let page = service.filter_paginated(&query).await?;
    Ok(Json(page))
}
