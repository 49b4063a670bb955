//! CORS preflight: every `OPTIONS` request is answered here, before routing.

use axum::{
  extract::Request,
  http::{HeaderValue, Method, StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};

use super::ALLOW_ORIGIN;

pub fn handler() -> Response {
  (
    StatusCode::NO_CONTENT,
    [
      ALLOW_ORIGIN,
      (header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS")),
      (header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("content-type")),
      (header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400")),
    ],
  )
    .into_response()
}

/// Middleware answering `OPTIONS` on any path, matched or not.
pub async fn preflight(req: Request, next: Next) -> Response {
  if req.method() == Method::OPTIONS {
    return handler();
  }
  next.run(req).await
}
