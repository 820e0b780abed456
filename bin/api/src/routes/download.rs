use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use geoq_auth::require_owner;
use geoq_entities::RequestStatus;
use geoq_entities::error::ApiError;
use tokio_util::io::ReaderStream;

use crate::auth::authenticate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new().route("/{id}", get(download))
}

async fn download(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> Result<Response, ApiError> {
  let ctx = authenticate(&state, &headers).await?;
  let request = state
    .store
    .get_request(id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
    .ok_or(ApiError::RequestNotFound)?;
  require_owner(&ctx, request.user_id)?;

  if request.status != RequestStatus::Done {
    return Err(ApiError::RequestNotYetAccomplished(
      request.status.to_string(),
    ));
  }

  let download = state
    .store
    .get_download_for_request(id)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
    .ok_or_else(|| {
      ApiError::RequestNotYetAccomplished(request.status.to_string())
    })?;

  let file = tokio::fs::File::open(&download.location_path)
    .await
    .map_err(|_| {
      ApiError::RequestNotYetAccomplished(request.status.to_string())
    })?;

  let stream = ReaderStream::new(file);
  let body = Body::from_stream(stream);

  let file_name = std::path::Path::new(&download.location_path)
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or("result");

  let mut response = Response::new(body);
  response.headers_mut().insert(
    header::CONTENT_TYPE,
    HeaderValue::from_static("application/octet-stream"),
  );
  response.headers_mut().insert(
    header::CONTENT_DISPOSITION,
    HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
      .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
  );
  Ok(response.into_response())
}
