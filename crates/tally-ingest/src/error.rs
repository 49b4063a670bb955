//! Error types and axum `IntoResponse` implementation.
//!
//! Every error renders as `{"error": "<code>", "message": "<text>"}` with the
//! status code its category calls for.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use tally_core::{node::AuthFailure, validate::Rejection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("rate limit exceeded; retry in {retry_after_secs}s")]
  RateLimited { retry_after_secs: u64 },

  #[error("content type must be application/json")]
  UnsupportedMediaType,

  #[error("body exceeds the {max} byte limit")]
  PayloadTooLarge { max: usize },

  #[error("failed to read request body: {0}")]
  BodyRead(#[source] axum::Error),

  #[error("{0}")]
  Auth(AuthFailure),

  #[error("malformed JSON: {0}")]
  MalformedJson(#[from] serde_json::Error),

  #[error("payload matches no supported provider shape")]
  Unsupported,

  #[error("{0}")]
  Rejected(#[from] Rejection),

  #[error("not found")]
  NotFound,

  #[error("method not allowed")]
  MethodNotAllowed,

  #[error("persistence failed: {0}")]
  Persist(#[from] tally_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error")]
  Internal,
}

impl From<tally_normalize::Error> for Error {
  fn from(e: tally_normalize::Error) -> Self {
    match e {
      tally_normalize::Error::Unsupported => Self::Unsupported,
    }
  }
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
      Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
      Self::Auth(AuthFailure::UnknownNode) => StatusCode::NOT_FOUND,
      Self::Auth(_) => StatusCode::FORBIDDEN,
      Self::BodyRead(_) | Self::MalformedJson(_) | Self::Unsupported => StatusCode::BAD_REQUEST,
      Self::Rejected(Rejection::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
      Self::Rejected(Rejection::Stale { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
      Self::Rejected(_) => StatusCode::BAD_REQUEST,
      Self::NotFound => StatusCode::NOT_FOUND,
      Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      Self::Persist(_) | Self::Store(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable machine-readable code for the `error` field.
  pub fn code(&self) -> &'static str {
    match self {
      Self::RateLimited { .. } => "rate_limited",
      Self::UnsupportedMediaType => "unsupported_media_type",
      Self::PayloadTooLarge { .. } => "payload_too_large",
      Self::BodyRead(_) => "body_read_failed",
      Self::Auth(failure) => failure.reason(),
      Self::MalformedJson(_) => "invalid_json",
      Self::Unsupported => "unsupported_payload",
      Self::Rejected(rejection) => rejection.reason(),
      Self::NotFound => "not_found",
      Self::MethodNotAllowed => "method_not_allowed",
      Self::Persist(_) | Self::Store(_) => "persistence_failed",
      Self::Internal => "internal",
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = json!({ "error": self.code(), "message": self.to_string() });
    let mut res = (status, Json(body)).into_response();
    if let Self::RateLimited { retry_after_secs } = self {
      res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    }
    res
  }
}
