use axum::http::HeaderMap;
use geoq_auth::AuthContext;
use geoq_entities::error::ApiError;

use crate::state::AppState;

/// Authenticates the `User-Token` header of an incoming request
/// against the store, throttling repeated failures per source IP.
pub async fn authenticate(
  state: &AppState,
  headers: &HeaderMap,
) -> Result<AuthContext, ApiError> {
  let header = headers
    .get("User-Token")
    .map(|v| v.to_str().map_err(|_| ApiError::ImproperUserToken))
    .transpose()?;
  geoq_auth::authenticate_rate_limited(
    &state.store,
    header,
    headers,
    &state.auth_rate_limiter,
  )
  .await
}
