use std::collections::HashSet;

use axum::Router;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use geoq_entities::error::ApiError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::authenticate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new().route("/users", post(create_user))
}

#[derive(Deserialize)]
struct CreateUserRequest {
  contact_name: String,
  #[serde(default)]
  user_id: Option<Uuid>,
  #[serde(default)]
  api_key: Option<String>,
  #[serde(default)]
  roles: HashSet<String>,
}

#[derive(Serialize)]
struct CreateUserResponse {
  user_id: Uuid,
  api_key: String,
}

async fn create_user(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(body): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>, ApiError> {
  let ctx = authenticate(&state, &headers).await?;
  if !ctx.is_admin() {
    return Err(ApiError::AuthorizationFailed);
  }

  let user = state
    .store
    .add_user(&body.contact_name, body.user_id, body.api_key, &body.roles)
    .await
    .map_err(|e| ApiError::Internal(e.into()))?;

  Ok(Json(CreateUserResponse { user_id: user.user_id, api_key: user.api_key }))
}
