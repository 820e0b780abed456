use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

/// Per-HTTP-request correlation id, attached to every log record for
/// the request it was generated for. Distinct from the numeric
/// `request_id` the store assigns to `execute` calls.
#[derive(Debug, Clone, Copy)]
pub struct Rid(pub Uuid);

impl std::fmt::Display for Rid {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub async fn attach_rid(mut req: Request, next: Next) -> Response {
  let rid = Rid(Uuid::new_v4());
  req.extensions_mut().insert(rid);

  let span = tracing::info_span!("request", rid = %rid, method = %req.method(), path = %req.uri().path());

  let mut response = next.run(req).instrument(span).await;
  response
    .headers_mut()
    .insert("x-request-id", rid.0.to_string().parse().unwrap());
  response
}
