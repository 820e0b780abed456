//! Raw `FromRow` shapes. Kept separate from the domain types in
//! `geoq-entities` because the database stores `status` as `TEXT`,
//! not the domain enum directly.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use geoq_entities::{Request, RequestStatus, Worker};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
pub struct RequestRow {
  pub request_id: i64,
  pub user_id: Uuid,
  pub dataset: String,
  pub product: String,
  pub query: serde_json::Value,
  pub status: String,
  pub priority: i32,
  pub estimate_size_bytes: Option<i64>,
  pub worker_id: Option<i64>,
  pub created_on: DateTime<Utc>,
  pub last_update: DateTime<Utc>,
  pub fail_reason: Option<String>,
}

impl From<RequestRow> for Request {
  fn from(row: RequestRow) -> Self {
    Request {
      request_id: row.request_id,
      user_id: row.user_id,
      dataset: row.dataset,
      product: row.product,
      query: row.query,
      // Unknown/future status strings map to PENDING — see
      // RequestStatus::from_str.
      status: RequestStatus::from_str(&row.status).unwrap(),
      priority: row.priority,
      estimate_size_bytes: row.estimate_size_bytes,
      worker_id: row.worker_id,
      created_on: row.created_on,
      last_update: row.last_update,
      fail_reason: row.fail_reason,
    }
  }
}

#[derive(FromRow)]
pub struct WorkerRow {
  pub worker_id: i64,
  pub host: String,
  pub status: String,
  pub scheduler_port: i32,
  pub dashboard_address: String,
  pub created_on: DateTime<Utc>,
}

impl From<WorkerRow> for Worker {
  fn from(row: WorkerRow) -> Self {
    Worker {
      worker_id: row.worker_id,
      host: row.host,
      status: row.status,
      scheduler_port: row.scheduler_port,
      dashboard_address: row.dashboard_address,
      created_on: row.created_on,
    }
  }
}
