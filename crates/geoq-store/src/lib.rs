//! Postgres-backed request store. A single [`Store`] wraps a
//! connection pool and is handed around as a `Clone`-able,
//! dependency-injected value — never accessed through a global.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use geoq_entities::{Download, Request, RequestStatus, Role, User, Worker};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

mod rows;
use rows::{RequestRow, WorkerRow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Db(#[from] sqlx::Error),
  #[error("request {0} not found")]
  RequestNotFound(i64),
  #[error("user {0} not found")]
  UserNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The statuses the admission broker and quota check treat as "using
/// a concurrency slot": not yet terminal, already past PENDING.
pub const IN_FLIGHT_STATUSES: [RequestStatus; 2] =
  [RequestStatus::Queued, RequestStatus::Running];

#[derive(Clone)]
pub struct Store {
  pool: PgPool,
}

impl Store {
  /// Connects and runs pending migrations. Call once at process
  /// startup; failure here is fatal (no store, no process).
  pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(10)
      .acquire_timeout(Duration::from_secs(10))
      .connect(database_url)
      .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Self { pool })
  }

  #[cfg(test)]
  pub fn from_pool(pool: PgPool) -> Self {
    Self { pool }
  }

  // ---- users -----------------------------------------------------

  pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
    let Some(row) = sqlx::query(
      "SELECT user_id, api_key, contact_name FROM users WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?
    else {
      return Ok(None);
    };

    let roles = self.get_user_roles(user_id).await?;
    Ok(Some(User {
      user_id: row.try_get("user_id")?,
      api_key: row.try_get("api_key")?,
      contact_name: row.try_get("contact_name")?,
      roles,
    }))
  }

  async fn get_user_roles(
    &self,
    user_id: Uuid,
  ) -> Result<HashSet<String>> {
    let names: Vec<String> = sqlx::query_scalar(
      "SELECT r.role_name FROM roles r \
       JOIN users_roles ur ON ur.role_id = r.role_id \
       WHERE ur.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(names.into_iter().collect())
  }

  /// Inserts a user. `user_id`/`api_key` are auto-generated (UUIDv4,
  /// 32-byte URL-safe token) when not supplied. Unknown role names are
  /// inserted into `roles` on the fly.
  pub async fn add_user(
    &self,
    contact_name: &str,
    user_id: Option<Uuid>,
    api_key: Option<String>,
    roles: &HashSet<String>,
  ) -> Result<User> {
    let user_id = user_id.unwrap_or_else(Uuid::new_v4);
    let api_key = api_key.unwrap_or_else(generate_api_key);

    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "INSERT INTO users (user_id, api_key, contact_name) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(&api_key)
    .bind(contact_name)
    .execute(&mut *tx)
    .await?;

    for role in roles {
      let role_id: i64 = sqlx::query_scalar(
        "INSERT INTO roles (role_name) VALUES ($1) \
         ON CONFLICT (role_name) DO UPDATE SET role_name = EXCLUDED.role_name \
         RETURNING role_id",
      )
      .bind(role)
      .fetch_one(&mut *tx)
      .await?;

      sqlx::query(
        "INSERT INTO users_roles (user_id, role_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
      )
      .bind(user_id)
      .bind(role_id)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;

    Ok(User { user_id, api_key, contact_name: contact_name.to_string(), roles: roles.clone() })
  }

  pub async fn list_roles(&self) -> Result<Vec<Role>> {
    let rows = sqlx::query("SELECT role_id, role_name FROM roles")
      .fetch_all(&self.pool)
      .await?;
    rows
      .into_iter()
      .map(|r: PgRow| {
        Ok(Role {
          role_id: r.try_get("role_id")?,
          role_name: r.try_get("role_name")?,
        })
      })
      .collect()
  }

  // ---- requests ----------------------------------------------------

  pub async fn create_request(
    &self,
    user_id: Uuid,
    dataset: &str,
    product: &str,
    query: &serde_json::Value,
    priority: i32,
  ) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
      "INSERT INTO requests (user_id, dataset, product, query, status, priority) \
       VALUES ($1, $2, $3, $4, $5, $6) RETURNING request_id",
    )
    .bind(user_id)
    .bind(dataset)
    .bind(product)
    .bind(query)
    .bind(RequestStatus::Pending.as_str())
    .bind(priority)
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  pub async fn get_request(&self, id: i64) -> Result<Option<Request>> {
    let row: Option<RequestRow> =
      sqlx::query_as("SELECT * FROM requests WHERE request_id = $1")
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
    Ok(row.map(Into::into))
  }

  pub async fn get_requests_by_user(
    &self,
    user_id: Uuid,
  ) -> Result<Vec<Request>> {
    let rows: Vec<RequestRow> = sqlx::query_as(
      "SELECT * FROM requests WHERE user_id = $1 ORDER BY created_on",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
  }

  /// Reads requests in a given status, ordered `(priority asc,
  /// created_on asc)` as required by the admission broker's FIFO scan.
  pub async fn get_requests(
    &self,
    status: RequestStatus,
  ) -> Result<Vec<Request>> {
    let rows: Vec<RequestRow> = sqlx::query_as(
      "SELECT * FROM requests WHERE status = $1 ORDER BY priority ASC, created_on ASC",
    )
    .bind(status.as_str())
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
  }

  /// Count of `user_id`'s requests currently occupying a concurrency
  /// slot (QUEUED or RUNNING) — the quantity the admission broker caps
  /// against `RUNNING_REQUEST_LIMIT`.
  pub async fn count_user_requests_in_flight(
    &self,
    user_id: Uuid,
  ) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
      "SELECT count(*) FROM requests WHERE user_id = $1 AND status = ANY($2)",
    )
    .bind(user_id)
    .bind(
      IN_FLIGHT_STATUSES.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    )
    .fetch_one(&self.pool)
    .await?;
    Ok(count)
  }

  /// Atomically flips a single row PENDING -> QUEUED. Returns `true`
  /// if this call performed the flip, `false` if the row was no longer
  /// PENDING (already claimed, or since raced by another broker
  /// instance). The at-most-one-publish-per-tick invariant rests on
  /// this being a single `UPDATE ... WHERE status = 'PENDING'`.
  pub async fn try_mark_queued(&self, id: i64) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE requests SET status = $1, last_update = now() \
       WHERE request_id = $2 AND status = $3",
    )
    .bind(RequestStatus::Queued.as_str())
    .bind(id)
    .bind(RequestStatus::Pending.as_str())
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  /// Atomically flips QUEUED -> RUNNING with the claiming worker's id.
  /// Returns `None` if the row was not QUEUED (duplicate delivery —
  /// the executor's documented idempotency check).
  pub async fn try_mark_running(
    &self,
    id: i64,
    worker_id: i64,
  ) -> Result<Option<Request>> {
    let row: Option<RequestRow> = sqlx::query_as(
      "UPDATE requests SET status = $1, worker_id = $2, last_update = now() \
       WHERE request_id = $3 AND status = $4 RETURNING *",
    )
    .bind(RequestStatus::Running.as_str())
    .bind(worker_id)
    .bind(id)
    .bind(RequestStatus::Queued.as_str())
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(Into::into))
  }

  /// Marks a RUNNING request DONE, inserting the `Download` row in the
  /// same transaction (the two writes commit atomically — a reader
  /// never observes `status = DONE` without the matching download).
  pub async fn mark_done(
    &self,
    id: i64,
    location_path: &str,
    download_uri: &str,
    size_bytes: i64,
  ) -> Result<()> {
    let mut tx = self.pool.begin().await?;

    let affected = sqlx::query(
      "UPDATE requests SET status = $1, last_update = now() \
       WHERE request_id = $2 AND status = $3",
    )
    .bind(RequestStatus::Done.as_str())
    .bind(id)
    .bind(RequestStatus::Running.as_str())
    .execute(&mut *tx)
    .await?;

    if affected.rows_affected() == 1 {
      sqlx::query(
        "INSERT INTO downloads (request_id, location_path, download_uri, size_bytes) \
         VALUES ($1, $2, $3, $4) ON CONFLICT (request_id) DO NOTHING",
      )
      .bind(id)
      .bind(location_path)
      .bind(download_uri)
      .bind(size_bytes)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  /// Fires from any non-terminal status (QUEUED or RUNNING), not just
  /// RUNNING: a request an executor refuses outright (e.g. an
  /// unsupported workflow message, spec.md §6) is still QUEUED when
  /// the rejection happens, since the workflow branch never calls
  /// [`Self::try_mark_running`]. A `WHERE status = 'RUNNING'` guard
  /// there would match zero rows and strand the request in QUEUED
  /// forever, permanently consuming a `RUNNING_REQUEST_LIMIT` slot.
  pub async fn mark_failed(
    &self,
    id: i64,
    fail_reason: &str,
  ) -> Result<()> {
    sqlx::query(
      "UPDATE requests SET status = $1, fail_reason = $2, last_update = now() \
       WHERE request_id = $3 AND status = ANY($4)",
    )
    .bind(RequestStatus::Failed.as_str())
    .bind(fail_reason)
    .bind(id)
    .bind(
      IN_FLIGHT_STATUSES.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    )
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// The only legal RUNNING -> PENDING transition: an out-of-band
  /// reaper flips rows whose `last_update` is stale beyond the given
  /// threshold. Returns the ids it reclaimed.
  pub async fn reap_stale_running(
    &self,
    stale_before: DateTime<Utc>,
  ) -> Result<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar(
      "UPDATE requests SET status = $1, worker_id = NULL, last_update = now() \
       WHERE status = $2 AND last_update < $3 RETURNING request_id",
    )
    .bind(RequestStatus::Pending.as_str())
    .bind(RequestStatus::Running.as_str())
    .bind(stale_before)
    .fetch_all(&self.pool)
    .await?;
    Ok(ids)
  }

  pub async fn get_download_for_request(
    &self,
    request_id: i64,
  ) -> Result<Option<Download>> {
    let row = sqlx::query(
      "SELECT download_id, request_id, location_path, download_uri, size_bytes, created_on \
       FROM downloads WHERE request_id = $1",
    )
    .bind(request_id)
    .fetch_optional(&self.pool)
    .await?;
    let Some(row) = row else { return Ok(None) };
    Ok(Some(Download {
      download_id: row.try_get("download_id")?,
      request_id: row.try_get("request_id")?,
      location_path: row.try_get("location_path")?,
      download_uri: row.try_get("download_uri")?,
      size_bytes: row.try_get("size_bytes")?,
      created_on: row.try_get("created_on")?,
    }))
  }

  // ---- workers -----------------------------------------------------

  pub async fn create_worker(
    &self,
    host: &str,
    scheduler_port: i32,
    dashboard_address: &str,
  ) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
      "INSERT INTO workers (host, status, scheduler_port, dashboard_address) \
       VALUES ($1, $2, $3, $4) RETURNING worker_id",
    )
    .bind(host)
    .bind("ALIVE")
    .bind(scheduler_port)
    .bind(dashboard_address)
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  pub async fn get_worker(&self, id: i64) -> Result<Option<Worker>> {
    let row: Option<WorkerRow> =
      sqlx::query_as("SELECT * FROM workers WHERE worker_id = $1")
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
    Ok(row.map(Into::into))
  }
}

fn generate_api_key() -> String {
  use base64::Engine;
  use rand::RngCore;
  let mut bytes = [0u8; 32];
  rand::rng().fill_bytes(&mut bytes);
  base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_api_key_is_32_bytes_url_safe() {
    let key = generate_api_key();
    assert!(!key.contains('+'));
    assert!(!key.contains('/'));
    use base64::Engine;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
      .decode(&key)
      .unwrap();
    assert_eq!(decoded.len(), 32);
  }
}
