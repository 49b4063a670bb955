//! `/webhook/{workspace_id}/{node_id}/{token}`: POST runs the ingestion
//! pipeline; any other method (OPTIONS aside) is a 405.

use std::net::SocketAddr;

use axum::{
  extract::{ConnectInfo, Path, Request, State},
  http::{HeaderValue, Method, StatusCode, header},
  response::{IntoResponse, Response},
};
use tally_core::store::IngestStore;

use super::ALLOW_ORIGIN;
use crate::{
  AppState,
  client_ip::client_ip,
  error::Error,
  pipeline::{self, WebhookTarget},
};

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Path(target): Path<WebhookTarget>,
  req: Request,
) -> Response
where
  S: IngestStore + Clone + 'static,
{
  if req.method() != Method::POST {
    let mut res = Error::MethodNotAllowed.into_response();
    res
      .headers_mut()
      .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
    return res;
  }

  let peer = req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| *addr);
  let ip = client_ip(req.headers(), peer, state.config.trust_proxy_headers);

  let (parts, body) = req.into_parts();
  let mut res = match pipeline::ingest(&state, &target, &ip, &parts.headers, body).await {
    Ok(_) => (StatusCode::OK, "ok").into_response(),
    Err(e) => {
      log_failure(&target, &ip, &e);
      e.into_response()
    }
  };
  let (name, value) = ALLOW_ORIGIN;
  res.headers_mut().insert(name, value);
  res
}

/// Client errors are expected traffic; only server-side failures are errors.
fn log_failure(target: &WebhookTarget, ip: &str, e: &Error) {
  let reason = e.code();
  let workspace_id = target.workspace_id.as_str();
  let node_id = target.node_id.as_str();
  match e {
    Error::Persist(_) | Error::Store(_) | Error::Internal => {
      tracing::error!(workspace_id, node_id, reason, error = %e, "webhook failed");
    }
    Error::RateLimited { .. } | Error::Auth(_) => {
      tracing::warn!(workspace_id, node_id, ip, reason, "webhook refused");
    }
    _ => {
      tracing::debug!(workspace_id, node_id, reason, error = %e, "webhook rejected");
    }
  }
}
