//! HTTP surface of the reference variant.
//!
//! - `/health` - liveness plus an embedded metrics snapshot
//! - `/metrics` - `{success, data: MetricsSnapshot}`
//! - `/items` and `/items/{id}` - CRUD over the in-memory store

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use mrb_common::ApiEnvelope;
use mrb_probe::MetricsProbe;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::store::{CreateItem, Item, ItemError, ItemStore, UpdateItem};

/// Default page size of `GET /items`.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Shared state for HTTP handlers.
pub struct VariantState {
    pub store: ItemStore,
    pub probe: MetricsProbe<'static>,
    /// Framework name reported by `/health`.
    pub framework: &'static str,
}

impl VariantState {
    pub fn new(probe: MetricsProbe<'static>) -> Self {
        Self {
            store: ItemStore::new(),
            probe,
            framework: "axum",
        }
    }
}

/// Create the router for the full variant contract.
pub fn create_router(state: VariantState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .with_state(Arc::new(state))
}

/// Error responses in the `{success: false, message}` shape.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ItemError> for ApiError {
    fn from(err: ItemError) -> Self {
        let status = match err {
            ItemError::Validation(_) => StatusCode::BAD_REQUEST,
            ItemError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, message = %self.message, "Request rejected");
        (self.status, Json(ApiEnvelope::<()>::error(self.message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health_handler(State(state): State<Arc<VariantState>>) -> impl IntoResponse {
    let snapshot = state.probe.get_metrics();
    let identity = state.probe.identity();

    Json(json!({
        "status": "healthy",
        "runtime": identity.runtime_id,
        "version": identity.runtime_version,
        "framework": state.framework,
        "metrics": snapshot,
    }))
}

async fn metrics_handler(State(state): State<Arc<VariantState>>) -> impl IntoResponse {
    Json(ApiEnvelope {
        success: true,
        data: Some(state.probe.get_metrics()),
        message: None,
        count: None,
    })
}

async fn create_item(
    State(state): State<Arc<VariantState>>,
    payload: Result<Json<CreateItem>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiEnvelope<Item>>)> {
    let Json(input) = payload?;
    let item = state.store.create(input)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok(item, "Item created successfully")),
    ))
}

async fn get_item(
    State(state): State<Arc<VariantState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiEnvelope<Item>>> {
    let item = state.store.get(&id)?;
    Ok(Json(ApiEnvelope::ok(item, "Item retrieved successfully")))
}

async fn update_item(
    State(state): State<Arc<VariantState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateItem>, JsonRejection>,
) -> ApiResult<Json<ApiEnvelope<Item>>> {
    let Json(input) = payload?;
    let item = state.store.update(&id, input)?;
    Ok(Json(ApiEnvelope::ok(item, "Item updated successfully")))
}

async fn delete_item(
    State(state): State<Arc<VariantState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiEnvelope<Item>>> {
    state.store.delete(&id)?;
    Ok(Json(ApiEnvelope {
        success: true,
        data: None,
        message: Some(format!("Item {id} deleted successfully")),
        count: None,
    }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_items(
    State(state): State<Arc<VariantState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ApiEnvelope<Vec<Item>>>> {
    let Query(params) = params?;
    let items = state.store.list(params.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    let count = items.len();
    Ok(Json(
        ApiEnvelope::ok(items, "Items retrieved successfully").with_count(count),
    ))
}
