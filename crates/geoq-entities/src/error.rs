use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The error taxonomy surfaced by the API gateway. Every variant maps
/// to exactly one HTTP status code and a `{"detail": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("User-Token header is present but empty")]
  EmptyUserToken,
  #[error("User-Token header is malformed")]
  ImproperUserToken,
  #[error("authentication failed")]
  AuthenticationFailed,
  #[error("not authorized for this resource")]
  AuthorizationFailed,
  #[error("unknown dataset '{0}'")]
  MissingDataset(String),
  #[error("unknown product '{0}' in dataset '{1}'")]
  MissingProduct(String, String),
  #[error("catalog entry is missing required key '{0}'")]
  MissingKeyInCatalogEntry(String),
  #[error(
    "estimated size {estimated_gb} GB exceeds the maximum allowed {allowed_gb} GB"
  )]
  MaximumAllowedSizeExceeded { estimated_gb: f64, allowed_gb: f64 },
  #[error("request not found")]
  RequestNotFound,
  #[error("request is not yet accomplished (status={0})")]
  RequestNotYetAccomplished(String),
  #[error("request is not yet done (status={0})")]
  RequestNotYetDone(String),
  #[error("artifact for request is empty or missing")]
  EmptyDataset,
  #[error("invalid query: {0}")]
  InvalidQuery(String),
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

impl ApiError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      ApiError::EmptyUserToken
      | ApiError::ImproperUserToken
      | ApiError::AuthenticationFailed
      | ApiError::MissingDataset(_)
      | ApiError::MissingProduct(..)
      | ApiError::MissingKeyInCatalogEntry(_)
      | ApiError::MaximumAllowedSizeExceeded { .. }
      | ApiError::RequestNotFound
      | ApiError::RequestNotYetDone(_)
      | ApiError::EmptyDataset
      | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
      ApiError::AuthorizationFailed => StatusCode::UNAUTHORIZED,
      ApiError::RequestNotYetAccomplished(_) => StatusCode::NOT_FOUND,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  detail: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if let ApiError::Internal(err) = &self {
      tracing::error!("unhandled internal error: {err:#}");
    }
    let detail = self.to_string();
    (self.status_code(), Json(ErrorBody { detail })).into_response()
  }
}
