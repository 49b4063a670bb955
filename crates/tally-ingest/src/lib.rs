//! HTTP ingestion layer for Tally.
//!
//! Exposes an axum [`Router`] that accepts provider webhooks at
//! `POST /webhook/{workspace_id}/{node_id}/{token}` and runs them through the
//! detect → normalize → validate → attribute → persist pipeline, backed by
//! any [`IngestStore`].

pub mod client_ip;
pub mod error;
pub mod handlers;
pub mod pipeline;

pub use error::Error;

use std::{any::Any, path::PathBuf, sync::Arc};

use axum::{
  Router,
  middleware,
  response::{IntoResponse, Response},
  routing::{any, get},
};
use serde::Deserialize;
use tally_core::{
  ratelimit::{FixedWindowLimiter, RateLimitConfig, RateLimiter},
  store::IngestStore,
  validate::Limits,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use handlers::{health, options, webhook};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TALLY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Read the client IP from `X-Forwarded-For` / `X-Real-IP`. Disable when
  /// the server is reachable without a proxy in front.
  pub trust_proxy_headers: bool,
  pub limits:              Limits,
  pub rate_limit:          RateLimitConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".to_string(),
      port:                8787,
      store_path:          PathBuf::from("tally.sqlite3"),
      trust_proxy_headers: true,
      limits:              Limits::default(),
      rate_limit:          RateLimitConfig::default(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: IngestStore> {
  pub store:   Arc<S>,
  pub config:  Arc<ServerConfig>,
  pub limiter: Arc<dyn RateLimiter>,
}

impl<S: IngestStore> AppState<S> {
  /// State with an in-process [`FixedWindowLimiter`] built from
  /// `config.rate_limit`.
  pub fn new(store: S, config: ServerConfig) -> Self {
    let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit));
    Self { store: Arc::new(store), config: Arc::new(config), limiter }
  }

  /// Swap in a different limiter, e.g. one shared between processes.
  pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
    self.limiter = limiter;
    self
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the ingestion server.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate limiter can fall back to the peer address.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: IngestStore + Clone + 'static,
{
  Router::new()
    .route("/webhook/{workspace_id}/{node_id}/{token}", any(webhook::handler::<S>))
    .route("/healthz",                                  get(health::handler))
    .fallback(health::not_found)
    .with_state(state)
    .layer(middleware::from_fn(options::preflight))
    .layer(CatchPanicLayer::custom(panic_response))
    .layer(TraceLayer::new_for_http())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
  let detail = panic
    .downcast_ref::<String>()
    .map(String::as_str)
    .or_else(|| panic.downcast_ref::<&str>().copied())
    .unwrap_or("unknown panic");
  tracing::error!(detail, "handler panicked");
  Error::Internal.into_response()
}
