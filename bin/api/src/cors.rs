use tower_http::cors::CorsLayer;

/// Builds permissive-by-default CORS, narrowed to an explicit allow
/// list when `CORS_ALLOWED_ORIGINS` is configured.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
  if allowed_origins.is_empty() {
    return CorsLayer::new()
      .allow_origin(tower_http::cors::Any)
      .allow_methods(tower_http::cors::Any)
      .allow_headers(tower_http::cors::Any);
  }

  let origins: Vec<_> = allowed_origins
    .iter()
    .filter_map(|origin| {
      axum::http::HeaderValue::from_str(origin)
        .inspect_err(|e| {
          tracing::warn!("invalid CORS allowed origin '{origin}': {e}")
        })
        .ok()
    })
    .collect();

  CorsLayer::new()
    .allow_origin(origins)
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}
