use std::sync::Arc;

use axum::Router;
use axum::middleware;
use geoq_auth::AuthRateLimiter;
use geoq_catalog::StaticCatalog;
use geoq_store::Store;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

#[macro_use]
extern crate tracing;

mod auth;
mod cors;
mod rid;
mod routes;
mod state;

use state::AppState;

async fn app() -> anyhow::Result<()> {
  let config = config::load()?;
  logger::init(&config.log)?;

  info!("geoquery API gateway version v{}", env!("CARGO_PKG_VERSION"));

  let store = Store::connect(&config.postgres_url()).await?;
  let catalog =
    Arc::new(StaticCatalog::from_yaml_file(&config.catalog_path)?);
  let auth_rate_limiter = AuthRateLimiter::new(
    config.auth_rate_limit_max_attempts,
    config.auth_rate_limit_window_seconds,
  );

  let state = AppState {
    store,
    catalog,
    auth_rate_limiter,
  };

  let router = Router::new()
    .route("/version", axum::routing::get(|| async { env!("CARGO_PKG_VERSION") }))
    .nest("/datasets", routes::datasets::router())
    .nest("/datasets", routes::execute::router())
    .nest("/requests", routes::requests::router())
    .nest("/download", routes::download::router())
    .nest("/admin", routes::admin::router())
    .layer(middleware::from_fn(rid::attach_rid))
    .layer(TraceLayer::new_for_http())
    .layer(CatchPanicLayer::new())
    .layer(cors::cors_layer(&config.cors_allowed_origins))
    .with_state(state);

  let addr = format!("{}:{}", config.api_host, config.api_port);
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  info!("listening on {addr}");
  axum::serve(listener, router).await?;

  Ok(())
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
