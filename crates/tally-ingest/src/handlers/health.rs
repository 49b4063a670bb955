//! Liveness probe and the JSON 404 fallback.

use axum::response::{IntoResponse, Response};

use crate::error::Error;

/// `GET /healthz`
pub async fn handler() -> &'static str { "ok" }

/// Any unmatched route.
pub async fn not_found() -> Response { Error::NotFound.into_response() }
