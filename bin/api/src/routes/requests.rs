use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Json;
use geoq_auth::require_owner;
use geoq_entities::RequestStatus;
use geoq_entities::error::ApiError;
use serde::Serialize;

use crate::auth::authenticate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_requests))
    .route("/{id}/status", get(status))
    .route("/{id}/size", get(size))
    .route("/{id}/uri", get(uri))
}

#[derive(Serialize)]
struct RequestView {
  request_id: i64,
  dataset: String,
  product: String,
  status: String,
  priority: i32,
  created_on: chrono::DateTime<chrono::Utc>,
  fail_reason: Option<String>,
}

impl From<geoq_entities::Request> for RequestView {
  fn from(r: geoq_entities::Request) -> Self {
    Self {
      request_id: r.request_id,
      dataset: r.dataset,
      product: r.product,
      status: r.status.to_string(),
      priority: r.priority,
      created_on: r.created_on,
      fail_reason: r.fail_reason,
    }
  }
}

async fn list_requests(
  State(state): State<AppState>,
  headers: HeaderMap,
) -> Result<Json<Vec<RequestView>>, ApiError> {
  let ctx = authenticate(&state, &headers).await?;
  let user = geoq_auth::require_authenticated(&ctx)?;
  let requests = state
    .store
    .get_requests_by_user(user.user_id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;
  Ok(Json(requests.into_iter().map(Into::into).collect()))
}

async fn fetch_owned(
  state: &AppState,
  headers: &HeaderMap,
  id: i64,
) -> Result<geoq_entities::Request, ApiError> {
  let ctx = authenticate(state, headers).await?;
  let request = state
    .store
    .get_request(id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
    .ok_or(ApiError::RequestNotFound)?;
  require_owner(&ctx, request.user_id)?;
  Ok(request)
}

#[derive(Serialize)]
struct StatusResponse {
  status: String,
  fail_reason: Option<String>,
}

async fn status(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
  let request = fetch_owned(&state, &headers, id).await?;
  Ok(Json(StatusResponse {
    status: request.status.to_string(),
    fail_reason: request.fail_reason,
  }))
}

#[derive(Serialize)]
struct SizeResponse {
  size_bytes: i64,
}

async fn size(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> Result<Json<SizeResponse>, ApiError> {
  let request = fetch_owned(&state, &headers, id).await?;
  if request.status != RequestStatus::Done {
    return Err(ApiError::EmptyDataset);
  }
  let download = state
    .store
    .get_download_for_request(id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
    .ok_or(ApiError::EmptyDataset)?;
  if download.size_bytes == 0 {
    return Err(ApiError::EmptyDataset);
  }
  Ok(Json(SizeResponse { size_bytes: download.size_bytes }))
}

#[derive(Serialize)]
struct UriResponse {
  download_uri: String,
}

async fn uri(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> Result<Json<UriResponse>, ApiError> {
  let request = fetch_owned(&state, &headers, id).await?;
  if request.status != RequestStatus::Done {
    return Err(ApiError::RequestNotYetDone(request.status.to_string()));
  }
  let download = state
    .store
    .get_download_for_request(id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
    .ok_or(ApiError::RequestNotYetDone(request.status.to_string()))?;
  Ok(Json(UriResponse { download_uri: download.download_uri }))
}
