//! Executor: registers a worker row, subscribes to `query_queue` with
//! prefetch=1, and runs each delivery to completion on a
//! `DASK_N_WORKERS`-bounded compute pool, without a real Dask cluster:
//! `geoq_catalog::CatalogEngine::execute` stands in for the
//! Dask-submitted job, and [`pool::ComputePool`] stands in for the
//! `Client`/`LocalCluster` pair.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use geoq_catalog::{CatalogEngine, StaticCatalog};
use geoq_entities::message::QueueMessage;
use geoq_entities::query::GeoQuery;
use geoq_queue::QueueConsumer;
use geoq_store::Store;

#[macro_use]
extern crate tracing;

mod pool;
use pool::ComputePool;

async fn app() -> anyhow::Result<()> {
  let config = config::load()?;
  logger::init(&config.log)?;

  info!("geoquery executor version v{}", env!("CARGO_PKG_VERSION"));

  let store = Store::connect(&config.postgres_url()).await?;
  let catalog =
    Arc::new(StaticCatalog::from_yaml_file(&config.catalog_path)?);

  let host =
    std::env::var("HOSTNAME").unwrap_or_else(|_| "executor".to_string());
  let worker_id = store
    .create_worker(
      &host,
      config.dask_scheduler_port as i32,
      &format!(":{}", config.dask_dashboard_port),
    )
    .await?;
  info!("registered as worker {worker_id}");

  let pool = Arc::new(ComputePool::new(config.dask_n_workers));

  let separator = config
    .message_separator
    .chars()
    .next()
    .unwrap_or(geoq_entities::message::DEFAULT_SEPARATOR);
  let consumer_tag = format!("executor-{worker_id}");
  let mut consumer = QueueConsumer::connect(
    &config.broker,
    &consumer_tag,
    1,
    separator,
  )
  .await?;

  info!("waiting for requests...");
  while let Some(next) = consumer.next().await {
    let (message, delivery) = match next {
      Ok(v) => v,
      Err(e) => {
        error!("failed to decode delivery: {e:#}");
        continue;
      }
    };

    let store = store.clone();
    let catalog = catalog.clone();
    let pool = pool.clone();
    let config = config.clone();

    tokio::spawn(async move {
      handle_message(&store, catalog, &pool, worker_id, &config, message)
        .await;
      if let Err(e) = geoq_queue::ack(&delivery).await {
        error!("failed to ack delivery: {e:#}");
      }
    });
  }

  warn!("queue consumer stream ended");
  Ok(())
}

/// One message, start to finish. Never propagates an
/// error: every failure path ends in a `Failed` (or silently
/// duplicate-skipped) row, logged here, with the ack left to the
/// caller so it always happens exactly once regardless of outcome.
async fn handle_message<C: CatalogEngine + Send + Sync + 'static>(
  store: &Store,
  catalog: Arc<C>,
  pool: &ComputePool,
  worker_id: i64,
  config: &AppConfig,
  message: QueueMessage,
) {
  let QueueMessage::Execute { request_id, dataset, product, query, format } =
    message
  else {
    let request_id = match &message {
      QueueMessage::Workflow { request_id, .. } => *request_id,
      QueueMessage::Execute { request_id, .. } => *request_id,
    };
    warn!(
      "request {request_id}: workflow messages are not implemented by this executor"
    );
    if let Err(e) = store
      .mark_failed(request_id, "workflow execution is not supported by this executor")
      .await
    {
      error!("request {request_id}: failed to record workflow rejection: {e:#}");
    }
    return;
  };

  let query: GeoQuery = match serde_json::from_value(query) {
    Ok(q) => q,
    Err(e) => {
      error!("request {request_id}: stored query is not a valid GeoQuery: {e:#}");
      let _ = store
        .mark_failed(request_id, &format!("malformed stored query: {e}"))
        .await;
      return;
    }
  };

  // Idempotency: a duplicate delivery finds the row already past
  // QUEUED (either still QUEUED-claimed by a racing delivery that
  // hasn't flipped it yet is impossible since this CAS is atomic, or
  // it is RUNNING/DONE/FAILED from the first delivery).
  let request = match store.try_mark_running(request_id, worker_id).await {
    Ok(Some(request)) => request,
    Ok(None) => {
      debug!("request {request_id}: not QUEUED, treating as duplicate delivery");
      return;
    }
    Err(e) => {
      error!("request {request_id}: failed to mark RUNNING: {e:#}");
      return;
    }
  };
  let _ = request;

  let permit = pool.acquire().await;
  let out_dir = PathBuf::from(&config.store_path).join(request_id.to_string());
  let job: tokio::task::JoinHandle<anyhow::Result<Option<PathBuf>>> =
    tokio::spawn(async move {
      let _permit = permit;
      catalog
        .execute(&dataset, &product, &query, &out_dir, &format)
        .await
    });

  let outcome = poll_job(job, config.sleep_sec, config.result_check_retries).await;

  match outcome {
    JobOutcome::Timeout => {
      warn!("request {request_id}: processing timeout");
      if let Err(e) =
        store.mark_failed(request_id, "Processing timeout").await
      {
        error!("request {request_id}: failed to record timeout: {e:#}");
      }
    }
    JobOutcome::Panicked(msg) => {
      error!("request {request_id}: executor task panicked: {msg}");
      if let Err(e) = store.mark_failed(request_id, &msg).await {
        error!("request {request_id}: failed to record panic: {e:#}");
      }
    }
    JobOutcome::Failed(err) => {
      let reason = format!("{err:#}");
      error!("request {request_id}: job failed: {reason}");
      if reason.starts_with(geoq_catalog::POOL_FAULT_PREFIX) {
        pool.mark_failed();
      }
      if let Err(e) = store.mark_failed(request_id, &reason).await {
        error!("request {request_id}: failed to record failure: {e:#}");
      }
    }
    JobOutcome::Empty => {
      warn!("request {request_id}: result was empty");
      if let Err(e) = store
        .mark_failed(
          request_id,
          "the query resulted in an empty dataset. check your request",
        )
        .await
      {
        error!("request {request_id}: failed to record empty result: {e:#}");
      }
    }
    JobOutcome::Done(path) => {
      let size_bytes = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len() as i64,
        Err(e) => {
          error!("request {request_id}: result file vanished before stat: {e:#}");
          let _ = store
            .mark_failed(request_id, "result artifact disappeared before it could be recorded")
            .await;
          return;
        }
      };
      let download_uri = format!("/download/{request_id}");
      if let Err(e) = store
        .mark_done(
          request_id,
          &path.to_string_lossy(),
          &download_uri,
          size_bytes,
        )
        .await
      {
        error!("request {request_id}: failed to record DONE: {e:#}");
      } else {
        info!("request {request_id}: done, {size_bytes} bytes");
      }
    }
  }

  if matches!(pool.health(), pool::PoolHealth::Failed | pool::PoolHealth::Closed) {
    pool.maybe_restart().await;
  }
}

enum JobOutcome {
  Done(PathBuf),
  Empty,
  Failed(anyhow::Error),
  Panicked(String),
  Timeout,
}

/// Manual poll loop standing in for Dask's future-polling: check
/// `is_finished()` every `sleep_sec`, up to `retries` times, then
/// abort and report a timeout.
async fn poll_job(
  job: tokio::task::JoinHandle<anyhow::Result<Option<PathBuf>>>,
  sleep_sec: u64,
  retries: u32,
) -> JobOutcome {
  let mut job = job;
  for _ in 0..retries {
    if job.is_finished() {
      return match job.await {
        Ok(Ok(Some(path))) => JobOutcome::Done(path),
        Ok(Ok(None)) => JobOutcome::Empty,
        Ok(Err(e)) => JobOutcome::Failed(e),
        Err(join_err) => JobOutcome::Panicked(join_err.to_string()),
      };
    }
    tokio::time::sleep(Duration::from_secs(sleep_sec)).await;
  }
  job.abort();
  JobOutcome::Timeout
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
