use std::path::PathBuf;

use anyhow::{Context, anyhow};
use logger::{LogConfig, LogLevel, StdioLogMode};
use serde::Deserialize;

fn default_result_check_retries() -> u32 {
  30
}

fn default_sleep_sec() -> u64 {
  30
}

fn default_message_separator() -> String {
  "\\".to_string()
}

fn default_dask_n_workers() -> usize {
  1
}

fn default_api_host() -> String {
  "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
  8080
}

fn default_logging_level() -> String {
  "info".to_string()
}

fn default_logging_format() -> String {
  "standard".to_string()
}

fn default_auth_rate_limit_max_attempts() -> usize {
  10
}

fn default_auth_rate_limit_window_seconds() -> u64 {
  60
}

/// Raw, flat environment representation. Mirrors the variable names of
/// the external interface 1:1 so `envy::from_env` needs no remapping.
#[derive(Debug, Deserialize)]
struct Env {
  postgres_host: String,
  postgres_port: u16,
  postgres_db: String,
  postgres_user: String,
  postgres_password: String,
  #[serde(default)]
  postgres_password_file: Option<PathBuf>,

  broker: String,

  catalog_path: PathBuf,
  #[serde(default)]
  cache_path: Option<PathBuf>,
  store_path: PathBuf,

  running_request_limit: i64,
  request_status_check_every: u64,

  #[serde(default)]
  dask_scheduler_port: Option<u16>,
  #[serde(default)]
  dask_dashboard_port: Option<u16>,
  #[serde(default = "default_dask_n_workers")]
  dask_n_workers: usize,
  #[serde(default = "default_result_check_retries")]
  result_check_retries: u32,
  #[serde(default = "default_sleep_sec")]
  sleep_sec: u64,
  #[serde(default = "default_message_separator")]
  message_separator: String,

  #[serde(default = "default_api_host")]
  api_host: String,
  #[serde(default = "default_api_port")]
  api_port: u16,
  #[serde(default)]
  cors_allowed_origins: Option<String>,

  #[serde(default = "default_logging_level")]
  logging_level: String,
  #[serde(default = "default_logging_format")]
  logging_format: String,
  #[serde(default)]
  otlp_endpoint: String,

  #[serde(default = "default_auth_rate_limit_max_attempts")]
  auth_rate_limit_max_attempts: usize,
  #[serde(default = "default_auth_rate_limit_window_seconds")]
  auth_rate_limit_window_seconds: u64,
}

/// Fully resolved, application-shaped configuration. Built once at
/// startup and handed to the rest of the process as a DI'd value
/// (`Arc<AppConfig>`), never read back through a global.
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub postgres_host: String,
  pub postgres_port: u16,
  pub postgres_db: String,
  pub postgres_user: String,
  pub postgres_password: String,

  pub broker: String,

  pub catalog_path: PathBuf,
  pub cache_path: PathBuf,
  pub store_path: PathBuf,

  pub running_request_limit: i64,
  pub request_status_check_every: u64,

  pub dask_scheduler_port: u16,
  pub dask_dashboard_port: u16,
  pub dask_n_workers: usize,
  pub result_check_retries: u32,
  pub sleep_sec: u64,
  pub message_separator: String,

  pub api_host: String,
  pub api_port: u16,
  pub cors_allowed_origins: Vec<String>,

  pub log: LogConfig,

  pub auth_rate_limit_max_attempts: usize,
  pub auth_rate_limit_window_seconds: u64,
}

impl AppConfig {
  pub fn postgres_url(&self) -> String {
    format!(
      "postgres://{}:{}@{}:{}/{}",
      self.postgres_user,
      self.postgres_password,
      self.postgres_host,
      self.postgres_port,
      self.postgres_db
    )
  }
}

/// Loads `.env` (if present) then the process environment into an
/// [`AppConfig`]. Fails loudly: callers should log the error and exit
/// rather than run with a partial configuration.
pub fn load() -> anyhow::Result<AppConfig> {
  dotenvy::dotenv().ok();

  let env: Env = envy::from_env()
    .context("failed to parse configuration from environment")?;

  let postgres_password =
    maybe_read_item_from_file(env.postgres_password_file.as_deref())?
      .unwrap_or(env.postgres_password);

  let logging_level = match env.logging_level.to_lowercase().as_str() {
    "error" => LogLevel::Error,
    "warn" => LogLevel::Warn,
    "info" => LogLevel::Info,
    "debug" => LogLevel::Debug,
    "trace" => LogLevel::Trace,
    other => {
      return Err(anyhow!("invalid LOGGING_LEVEL '{other}'"));
    }
  };

  let logging_format = match env.logging_format.to_lowercase().as_str()
  {
    "standard" | "pretty" => StdioLogMode::Standard,
    "json" => StdioLogMode::Json,
    "none" => StdioLogMode::None,
    other => {
      return Err(anyhow!("invalid LOGGING_FORMAT '{other}'"));
    }
  };

  Ok(AppConfig {
    postgres_host: env.postgres_host,
    postgres_port: env.postgres_port,
    postgres_db: env.postgres_db,
    postgres_user: env.postgres_user,
    postgres_password,

    broker: env.broker,

    catalog_path: env.catalog_path,
    cache_path: env.cache_path.unwrap_or_else(|| PathBuf::from("/tmp/geoquery-cache")),
    store_path: env.store_path,

    running_request_limit: env.running_request_limit,
    request_status_check_every: env.request_status_check_every,

    dask_scheduler_port: env.dask_scheduler_port.unwrap_or(8786),
    dask_dashboard_port: env.dask_dashboard_port.unwrap_or(8787),
    dask_n_workers: env.dask_n_workers,
    result_check_retries: env.result_check_retries,
    sleep_sec: env.sleep_sec,
    message_separator: env.message_separator,

    api_host: env.api_host,
    api_port: env.api_port,
    cors_allowed_origins: env
      .cors_allowed_origins
      .map(|origins| {
        origins.split(',').map(|s| s.trim().to_string()).collect()
      })
      .unwrap_or_default(),

    log: LogConfig {
      level: logging_level,
      stdio: logging_format,
      pretty: matches!(logging_format, StdioLogMode::Standard),
      location: false,
      ansi: true,
      otlp_endpoint: env.otlp_endpoint,
      opentelemetry_service_name: "geoquery".to_string(),
      opentelemetry_scope_name: "geoquery".to_string(),
    },

    auth_rate_limit_max_attempts: env.auth_rate_limit_max_attempts,
    auth_rate_limit_window_seconds: env
      .auth_rate_limit_window_seconds,
  })
}

/// Reads a secret from a file path if given (the `_FILE` sibling
/// convention), otherwise falls through to the plain env var value.
fn maybe_read_item_from_file(
  path: Option<&std::path::Path>,
) -> anyhow::Result<Option<String>> {
  let Some(path) = path else {
    return Ok(None);
  };
  let contents = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read secret file {path:?}"))?;
  Ok(Some(contents.trim().to_string()))
}
