use std::sync::Arc;

use geoq_auth::AuthRateLimiter;
use geoq_catalog::StaticCatalog;
use geoq_store::Store;

/// Handed to every handler via axum's `State` extractor. Constructed
/// once at startup and never mutated — no global statics, per the
/// dependency-injected-handle redesign. The gateway never touches the
/// queue directly: it only ever creates PENDING rows, so no
/// `QueuePublisher` handle lives here — that belongs to `bin/broker`.
#[derive(Clone)]
pub struct AppState {
  pub store: Store,
  pub catalog: Arc<StaticCatalog>,
  pub auth_rate_limiter: Arc<AuthRateLimiter>,
}
