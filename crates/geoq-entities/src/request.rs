use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::RequestStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub request_id: i64,
  pub user_id: Uuid,
  pub dataset: String,
  pub product: String,
  /// Stored verbatim as submitted; never re-serialized/normalized.
  pub query: serde_json::Value,
  pub status: RequestStatus,
  pub priority: i32,
  pub estimate_size_bytes: Option<i64>,
  pub worker_id: Option<i64>,
  pub created_on: DateTime<Utc>,
  pub last_update: DateTime<Utc>,
  pub fail_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
  pub download_id: i64,
  pub request_id: i64,
  pub location_path: String,
  pub download_uri: String,
  pub size_bytes: i64,
  pub created_on: DateTime<Utc>,
}
