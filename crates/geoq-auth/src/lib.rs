//! `User-Token` authentication and product-role authorization.
//!
//! Auth failures are throttled per caller IP with a sliding-window
//! counter: only failures count, successes never reset or advance it.
//! Built directly against [`cache::CloneCache`] rather than
//! `rate_limit`'s trait, since that trait is coupled to an
//! RPC-oriented error type this crate's [`geoq_entities::ApiError`]
//! doesn't need to round-trip through.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use cache::CloneCache;
use geoq_entities::error::ApiError;
use geoq_entities::token::{UserToken, parse_user_token, scopes_for_roles};
use geoq_entities::user::{ROLE_ADMIN, ROLE_PUBLIC};
use geoq_entities::User;
use geoq_store::Store;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The outcome of authenticating a request: either no caller identity
/// (`ANONYMOUS` scope only) or a looked-up, key-verified user.
#[derive(Debug, Clone)]
pub struct AuthContext {
  pub user: Option<User>,
  pub scopes: HashSet<String>,
}

impl AuthContext {
  pub fn anonymous() -> Self {
    Self { user: None, scopes: HashSet::from(["ANONYMOUS".to_string()]) }
  }

  pub fn is_admin(&self) -> bool {
    self.scopes.contains("ADMIN")
  }

  pub fn has_role(&self, role: &str) -> bool {
    self.is_admin() || self.scopes.contains(role)
  }

  /// True if `product_role` grants access under this context: public
  /// products are always visible; everything else needs the matching
  /// scope or admin.
  pub fn authorized_for_product_role(
    &self,
    product_role: &str,
  ) -> bool {
    product_role == ROLE_PUBLIC || self.has_role(product_role)
  }

  pub fn user_id(&self) -> Option<Uuid> {
    self.user.as_ref().map(|u| u.user_id)
  }
}

/// Authenticates a `User-Token` header against the store.
pub async fn authenticate(
  store: &Store,
  header: Option<&str>,
) -> Result<AuthContext, ApiError> {
  match parse_user_token(header)? {
    UserToken::Anonymous => Ok(AuthContext::anonymous()),
    UserToken::Present { user_id, api_key } => {
      let user = store
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .ok_or(ApiError::AuthenticationFailed)?;

      if !constant_time_eq(&user.api_key, &api_key) {
        return Err(ApiError::AuthenticationFailed);
      }

      let scopes = scopes_for_roles(&user.roles);
      Ok(AuthContext { user: Some(user), scopes })
    }
  }
}

/// Same as [`authenticate`], but throttles repeated authentication
/// failures per source IP: successful authentications never count
/// against the window, failures accumulate and eventually cause
/// further attempts from that IP to fail closed (still surfaced as
/// the ordinary `AuthenticationFailed` 400 — there is no distinct
/// rate-limit status in the contract).
pub async fn authenticate_rate_limited(
  store: &Store,
  header: Option<&str>,
  headers: &HeaderMap,
  limiter: &AuthRateLimiter,
) -> Result<AuthContext, ApiError> {
  let ip = extract_ip(headers);
  limiter.check(ip).await?;

  match authenticate(store, header).await {
    Ok(ctx) => Ok(ctx),
    Err(err) => {
      limiter.record_failure(ip).await;
      Err(err)
    }
  }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
  a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Rejects anonymous callers for write/owning operations.
pub fn require_authenticated(
  ctx: &AuthContext,
) -> Result<&User, ApiError> {
  ctx.user.as_ref().ok_or(ApiError::AuthorizationFailed)
}

/// Rejects callers that don't own `resource_user_id`, admins excepted.
pub fn require_owner(
  ctx: &AuthContext,
  resource_user_id: Uuid,
) -> Result<(), ApiError> {
  let user = require_authenticated(ctx)?;
  if ctx.is_admin() || user.user_id == resource_user_id {
    Ok(())
  } else {
    Err(ApiError::AuthorizationFailed)
  }
}

/// `admin` is implicitly a superset of all product roles.
pub fn role_satisfied(scopes: &HashSet<String>, role: &str) -> bool {
  role == ROLE_PUBLIC
    || scopes.contains(ROLE_ADMIN)
    || scopes.contains("ADMIN")
    || scopes.contains(role)
}

fn extract_ip(headers: &HeaderMap) -> IpAddr {
  for name in ["x-forwarded-for", "x-real-ip"] {
    if let Some(value) = headers.get(name)
      && let Ok(value) = value.to_str()
      && let Some(first) = value.split(',').next()
      && let Ok(ip) = first.trim().parse()
    {
      return ip;
    }
  }
  IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

/// Sliding-window counter of authentication failures per IP.
pub struct AuthRateLimiter {
  attempts: CloneCache<IpAddr, Arc<RwLock<Vec<Instant>>>>,
  disabled: bool,
  max_attempts: usize,
  window: Duration,
}

impl AuthRateLimiter {
  pub fn new(max_attempts: usize, window_seconds: u64) -> Arc<Self> {
    let limiter = Arc::new(Self {
      attempts: CloneCache::default(),
      disabled: max_attempts == 0,
      max_attempts,
      window: Duration::from_secs(window_seconds),
    });
    if !limiter.disabled {
      spawn_cleanup_task(limiter.clone());
    }
    limiter
  }

  async fn check(&self, ip: IpAddr) -> Result<(), ApiError> {
    if self.disabled {
      return Ok(());
    }
    let attempts = self.attempts.get_or_insert_default(&ip).await;
    let window_start = Instant::now() - self.window;
    let count =
      attempts.read().await.iter().filter(|&&t| t > window_start).count();
    if count >= self.max_attempts {
      tracing::warn!(%ip, "authentication attempts rate limited");
      return Err(ApiError::AuthenticationFailed);
    }
    Ok(())
  }

  async fn record_failure(&self, ip: IpAddr) {
    if self.disabled {
      return;
    }
    let attempts = self.attempts.get_or_insert_default(&ip).await;
    let window_start = Instant::now() - self.window;
    let mut write = attempts.write().await;
    write.retain(|&t| t > window_start);
    write.push(Instant::now());
  }
}

fn spawn_cleanup_task(limiter: Arc<AuthRateLimiter>) {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
      interval.tick().await;
      let remove_before = Instant::now() - Duration::from_secs(15 * 60);
      limiter
        .attempts
        .retain(|_, attempts| {
          let Ok(attempts) = attempts.try_read() else {
            return true;
          };
          let Some(&last) = attempts.last() else {
            return false;
          };
          last > remove_before
        })
        .await;
    }
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn public_role_always_satisfied() {
    assert!(role_satisfied(&HashSet::new(), ROLE_PUBLIC));
  }

  #[test]
  fn admin_scope_satisfies_any_role() {
    let scopes = HashSet::from(["ADMIN".to_string()]);
    assert!(role_satisfied(&scopes, "era5-restricted"));
  }

  #[test]
  fn missing_role_not_satisfied() {
    let scopes = HashSet::from(["AUTHENTICATED".to_string()]);
    assert!(!role_satisfied(&scopes, "era5-restricted"));
  }

  #[test]
  fn anonymous_context_has_only_anonymous_scope() {
    let ctx = AuthContext::anonymous();
    assert!(ctx.scopes.contains("ANONYMOUS"));
    assert!(!ctx.is_admin());
    assert!(require_authenticated(&ctx).is_err());
  }

  #[tokio::test]
  async fn rate_limiter_trips_after_max_failures() {
    let limiter = AuthRateLimiter::new(2, 60);
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    limiter.check(ip).await.unwrap();
    limiter.record_failure(ip).await;
    limiter.check(ip).await.unwrap();
    limiter.record_failure(ip).await;
    assert!(limiter.check(ip).await.is_err());
  }

  #[tokio::test]
  async fn rate_limiter_disabled_when_max_attempts_zero() {
    let limiter = AuthRateLimiter::new(0, 60);
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    for _ in 0..10 {
      limiter.check(ip).await.unwrap();
      limiter.record_failure(ip).await;
    }
    assert!(limiter.check(ip).await.is_ok());
  }
}
