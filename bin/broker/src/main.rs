//! Admission broker: the single process allowed to promote a PENDING
//! request to QUEUED. A decorator-wrapped periodic-interval loop
//! re-expressed as a plain `tokio::time::interval` loop, spawned once
//! from `main` as its own background task.

use std::time::Duration;

use geoq_entities::message::QueueMessage;
use geoq_entities::status::RequestStatus;
use geoq_queue::QueuePublisher;
use geoq_store::Store;

#[macro_use]
extern crate tracing;

async fn app() -> anyhow::Result<()> {
  let config = config::load()?;
  logger::init(&config.log)?;

  info!("geoquery admission broker version v{}", env!("CARGO_PKG_VERSION"));
  info!(
    "request limit set to {} per user, ticking every {}s",
    config.running_request_limit, config.request_status_check_every
  );

  let store = Store::connect(&config.postgres_url()).await?;
  let separator = config
    .message_separator
    .chars()
    .next()
    .unwrap_or(geoq_entities::message::DEFAULT_SEPARATOR);
  let publisher =
    QueuePublisher::connect(&config.broker, separator).await?;

  let mut ticker = tokio::time::interval(Duration::from_secs(
    config.request_status_check_every,
  ));

  let stale_after = Duration::from_secs(
    2 * config.result_check_retries as u64 * config.sleep_sec,
  );

  loop {
    ticker.tick().await;
    if let Err(e) =
      emit_permitted_messages(&store, &publisher, config.running_request_limit)
        .await
    {
      error!("error occurred during broker processing: {e:#}");
    }
    if let Err(e) = reap_stale_running(&store, stale_after).await {
      error!("error occurred while reaping stale running requests: {e:#}");
    }
  }
}

/// The out-of-band reaper spec.md §7 leaves unspecified as a separate
/// process: run it from the broker's own tick, since the broker is
/// already the sole periodic control loop and the quota invariant it
/// enforces (`count_user_requests_in_flight`) depends on RUNNING rows
/// reflecting reality. A request whose executor died without
/// reporting is flipped back to PENDING so it is re-queued rather than
/// leaking out of the user's quota forever.
async fn reap_stale_running(
  store: &Store,
  stale_after: Duration,
) -> anyhow::Result<()> {
  let stale_before = chrono::Utc::now()
    - chrono::Duration::from_std(stale_after)
      .unwrap_or(chrono::Duration::seconds(3600));
  let reclaimed = store.reap_stale_running(stale_before).await?;
  if !reclaimed.is_empty() {
    warn!(
      "reaped {} stale RUNNING request(s) back to PENDING: {:?}",
      reclaimed.len(),
      reclaimed
    );
  }
  Ok(())
}

/// One tick: scan PENDING requests oldest-priority-first, promote the
/// ones under quota to QUEUED, publish them. A publish failure aborts
/// the rest of this tick's batch — already-promoted rows earlier in
/// the same tick are unaffected, and the row that failed is simply
/// re-scanned (still PENDING) on the next tick.
async fn emit_permitted_messages(
  store: &Store,
  publisher: &QueuePublisher,
  running_request_limit: i64,
) -> anyhow::Result<()> {
  debug!("obtaining pending requests from the store...");
  let pending = store.get_requests(RequestStatus::Pending).await?;
  debug!("found {} pending requests", pending.len());

  let mut emitted = 0usize;
  for request in &pending {
    let in_flight =
      store.count_user_requests_in_flight(request.user_id).await?;
    if in_flight >= running_request_limit {
      debug!(
        "user {} has {} requests in flight, at or above the limit of {}",
        request.user_id, in_flight, running_request_limit
      );
      continue;
    }

    let message = to_queue_message(request);
    publisher.publish(&message).await?;

    if !store.try_mark_queued(request.request_id).await? {
      // Lost the race to another instance (there should only ever be
      // one, but the CAS makes this safe regardless). The message is
      // already on the queue; the executor's idempotency check on
      // QUEUED status handles the resulting duplicate delivery.
      warn!(
        "request {} was no longer PENDING by the time it was promoted",
        request.request_id
      );
      continue;
    }
    emitted += 1;
  }

  info!("{emitted} requests published to the queue");
  Ok(())
}

/// Reconstructs the queue message from a stored row. A `query` tagged
/// `{"type": "workflow", "tasks": ...}` (tagged by `POST .../workflow`) decodes
/// as a workflow intent; anything else is a `GeoQuery` execute intent,
/// whose `format` field travels inside the stored query JSON itself.
fn to_queue_message(request: &geoq_entities::Request) -> QueueMessage {
  if request.query.get("type").and_then(|v| v.as_str())
    == Some("workflow")
  {
    let tasks = request
      .query
      .get("tasks")
      .cloned()
      .unwrap_or(serde_json::Value::Null);
    return QueueMessage::Workflow { request_id: request.request_id, tasks };
  }

  let format = request
    .query
    .get("format")
    .and_then(|v| v.as_str())
    .unwrap_or("netcdf")
    .to_string();

  QueueMessage::Execute {
    request_id: request.request_id,
    dataset: request.dataset.clone(),
    product: request.product.clone(),
    query: request.query.clone(),
    format,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use uuid::Uuid;

  fn request_with_query(query: serde_json::Value) -> geoq_entities::Request {
    geoq_entities::Request {
      request_id: 1,
      user_id: Uuid::new_v4(),
      dataset: "era5".to_string(),
      product: "reanalysis".to_string(),
      query,
      status: RequestStatus::Pending,
      priority: 0,
      estimate_size_bytes: None,
      worker_id: None,
      created_on: Utc::now(),
      last_update: Utc::now(),
      fail_reason: None,
    }
  }

  #[test]
  fn execute_query_defaults_format_when_absent() {
    let request = request_with_query(serde_json::json!({"variable": "t2m"}));
    let message = to_queue_message(&request);
    match message {
      QueueMessage::Execute { format, dataset, product, .. } => {
        assert_eq!(format, "netcdf");
        assert_eq!(dataset, "era5");
        assert_eq!(product, "reanalysis");
      }
      QueueMessage::Workflow { .. } => panic!("expected Execute"),
    }
  }

  #[test]
  fn execute_query_carries_explicit_format() {
    let request =
      request_with_query(serde_json::json!({"variable": "t2m", "format": "geotiff"}));
    let message = to_queue_message(&request);
    assert!(matches!(message, QueueMessage::Execute { format, .. } if format == "geotiff"));
  }

  #[test]
  fn workflow_tagged_query_decodes_as_workflow() {
    let tasks = serde_json::json!([{"id": "a", "op": "subset"}]);
    let request = request_with_query(
      serde_json::json!({"type": "workflow", "tasks": tasks.clone()}),
    );
    let message = to_queue_message(&request);
    match message {
      QueueMessage::Workflow { tasks: decoded, .. } => {
        assert_eq!(decoded, tasks);
      }
      QueueMessage::Execute { .. } => panic!("expected Workflow"),
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  if let Err(e) = app().await {
    eprintln!("FATAL: {e:#}");
    std::process::exit(1);
  }
  Ok(())
}
