use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Json;
use geoq_auth::require_authenticated;
use geoq_catalog::CatalogEngine;
use geoq_entities::bytes::{ByteUnit, bytes_in_unit};
use geoq_entities::error::ApiError;
use geoq_entities::query::GeoQuery;
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::routes::datasets::authorized_product;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/{dataset}/{product}/execute", post(execute))
    .route("/{dataset}/{product}/workflow", post(workflow))
}

#[derive(Serialize)]
pub struct ExecuteResponse {
  request_id: i64,
}

#[derive(Deserialize)]
pub struct ExecuteParams {
  format: Option<String>,
}

/// Inserts a PENDING row; it does not publish. Promotion to QUEUED and
/// the actual `query_queue` publish are the admission broker's job —
/// the gateway only ever creates rows. `format` travels as a query
/// param and is folded into the stored query JSON so the
/// broker can recover it verbatim when it reconstructs the queue
/// message at promotion time (`GeoQuery::format` wins if both are
/// given, since it is the more specific, body-level setting).
async fn execute(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((dataset, product)): Path<(String, String)>,
  Query(params): Query<ExecuteParams>,
  Json(query): Json<GeoQuery>,
) -> Result<Json<ExecuteResponse>, ApiError> {
  let ctx = authenticate(&state, &headers).await?;
  let user = require_authenticated(&ctx)?;

  let info =
    authorized_product(&state, &headers, &dataset, &product).await?;
  query.validate().map_err(|e| ApiError::InvalidQuery(e.to_string()))?;

  let estimate_bytes =
    state.catalog.estimate(&dataset, &product, &query).await?;
  let allowed_bytes =
    (info.maximum_query_size_gb * ByteUnit::GigaBytes.factor()) as u64;
  if estimate_bytes > allowed_bytes {
    return Err(ApiError::MaximumAllowedSizeExceeded {
      estimated_gb: bytes_in_unit(estimate_bytes, ByteUnit::GigaBytes),
      allowed_gb: info.maximum_query_size_gb,
    });
  }

  let mut query_json = serde_json::to_value(&query)
    .map_err(|e| ApiError::InvalidQuery(e.to_string()))?;
  if query_json.get("format").and_then(|v| v.as_str()).is_none()
    && let Some(format) = &params.format
  {
    query_json["format"] = serde_json::Value::String(format.clone());
  }

  let request_id = state
    .store
    .create_request(user.user_id, &dataset, &product, &query_json, 0)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

  Ok(Json(ExecuteResponse { request_id }))
}

/// `POST …/workflow` mirrors the execute contract for the reserved
/// `workflow` queue message shape: a DAG of operators rather than a
/// single `GeoQuery`. The tasks DAG is tagged with a `type: "workflow"`
/// marker so the broker can tell it apart from a plain `GeoQuery` row
/// when it reconstructs the queue message at promotion time. Not every
/// executor implements workflows — that is an executor-side decision
/// not gated here.
async fn workflow(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((dataset, product)): Path<(String, String)>,
  Json(tasks): Json<serde_json::Value>,
) -> Result<Json<ExecuteResponse>, ApiError> {
  let ctx = authenticate(&state, &headers).await?;
  let user = require_authenticated(&ctx)?;

  authorized_product(&state, &headers, &dataset, &product).await?;

  let tagged = serde_json::json!({ "type": "workflow", "tasks": tasks });

  let request_id = state
    .store
    .create_request(user.user_id, &dataset, &product, &tagged, 0)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

  Ok(Json(ExecuteResponse { request_id }))
}
