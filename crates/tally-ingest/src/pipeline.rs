//! The ingestion pipeline behind the webhook route.
//!
//! Gates run cheapest first and nothing touches the store until the caller
//! is admitted, the request is well-formed, and the node/token triple checks
//! out. Every stage returns a distinguishable [`Error`].

use std::{future::poll_fn, pin::Pin};

use axum::{
  body::Body,
  http::{HeaderMap, header},
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use http_body::Body as _;
use serde::Deserialize;
use tally_core::{
  attribute::attribute,
  node::{authorize, hash_token},
  ratelimit::{Admission, RateScope},
  sink::{Persisted, persist},
  store::IngestStore,
  validate::validate,
};

use crate::{AppState, error::Error};

/// The path parameters of a webhook URL.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookTarget {
  pub workspace_id: String,
  pub node_id:      String,
  pub token:        String,
}

pub async fn ingest<S>(
  state: &AppState<S>,
  target: &WebhookTarget,
  client_ip: &str,
  headers: &HeaderMap,
  body: Body,
) -> Result<Persisted, Error>
where
  S: IngestStore,
{
  let now = Utc::now();
  let limits = &state.config.limits;

  admit(state, target, client_ip, now)?;
  check_content_type(headers)?;
  check_declared_length(headers, limits.max_body_bytes)?;

  let node = state
    .store
    .get_node(&target.node_id)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;
  authorize(node, &target.workspace_id, &target.token).map_err(Error::Auth)?;

  let body = read_body(body, limits.max_body_bytes).await?;
  let payload: serde_json::Value = serde_json::from_slice(&body)?;
  let draft = tally_normalize::normalize(&payload, now)?;
  let event = validate(draft, body.len(), now, limits)?;

  let mappings = state
    .store
    .product_mappings(&target.workspace_id, &target.node_id)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;
  let items = attribute(&event, &mappings);

  let persisted = persist(
    state.store.as_ref(),
    &target.workspace_id,
    &target.node_id,
    &event,
    &items,
  )
  .await?;

  tracing::info!(
    workspace_id = %target.workspace_id,
    node_id = %target.node_id,
    provider = %event.provider,
    provider_event_id = %event.provider_event_id,
    duplicate = persisted.duplicate,
    items = items.len(),
    items_written = persisted.items_written,
    "event ingested"
  );
  Ok(persisted)
}

/// IP first; a request refused on IP does not spend token quota. Tokens are
/// counted under their digest so plaintext never sits in limiter memory.
fn admit<S: IngestStore>(
  state: &AppState<S>,
  target: &WebhookTarget,
  client_ip: &str,
  now: DateTime<Utc>,
) -> Result<(), Error> {
  let checks = [
    (RateScope::Ip, client_ip.to_owned()),
    (RateScope::Token, hash_token(&target.token)),
  ];
  for (scope, key) in checks {
    if let Admission::Limited { retry_after_secs } = state.limiter.check(scope, &key, now) {
      return Err(Error::RateLimited { retry_after_secs });
    }
  }
  Ok(())
}

/// `application/json`, with or without parameters such as `charset`.
fn check_content_type(headers: &HeaderMap) -> Result<(), Error> {
  let essence = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(';').next())
    .map(str::trim);
  match essence {
    Some(mime) if mime.eq_ignore_ascii_case("application/json") => Ok(()),
    _ => Err(Error::UnsupportedMediaType),
  }
}

/// Reject on the declared `Content-Length` before reading anything.
fn check_declared_length(headers: &HeaderMap, max: usize) -> Result<(), Error> {
  let declared = headers
    .get(header::CONTENT_LENGTH)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.trim().parse::<u64>().ok());
  match declared {
    Some(len) if len > max as u64 => Err(Error::PayloadTooLarge { max }),
    _ => Ok(()),
  }
}

/// Read at most `max` bytes; a longer body is rejected whatever it declared.
/// A body stream that fails partway is a read error, not an oversize one.
async fn read_body(mut body: Body, max: usize) -> Result<Bytes, Error> {
  let mut buf = BytesMut::new();
  while let Some(frame) = poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
    let Ok(data) = frame.map_err(Error::BodyRead)?.into_data() else {
      continue;
    };
    if buf.len() + data.len() > max {
      return Err(Error::PayloadTooLarge { max });
    }
    buf.extend_from_slice(&data);
  }
  Ok(buf.freeze())
}
