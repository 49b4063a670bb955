pub mod health;
pub mod options;
pub mod webhook;

use axum::http::{HeaderName, HeaderValue, header};

/// CORS headers carried by preflight and webhook responses.
pub(super) const ALLOW_ORIGIN: (HeaderName, HeaderValue) =
  (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
