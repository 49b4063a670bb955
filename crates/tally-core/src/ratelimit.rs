//! Fixed-window request admission.
//!
//! The limiter is a capability handed to the pipeline, not a global. The
//! in-process [`FixedWindowLimiter`] is advisory: separate processes do not
//! share counts. A shared implementation only has to provide
//! [`RateLimiter::check`].

use std::{collections::HashMap, sync::Mutex};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// What a counter is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateScope {
  Ip,
  Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Admitted,
  /// Rejected; the current window ends in `retry_after_secs`.
  Limited { retry_after_secs: u64 },
}

impl Admission {
  pub fn is_admitted(&self) -> bool { matches!(self, Self::Admitted) }
}

pub trait RateLimiter: Send + Sync {
  /// Count one request for `key` under `scope` and decide whether to admit it.
  fn check(&self, scope: RateScope, key: &str, now: DateTime<Utc>) -> Admission;
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  pub window_secs: u64,
  pub per_ip:      u32,
  pub per_token:   u32,
}

impl Default for RateLimitConfig {
  fn default() -> Self { Self { window_secs: 60, per_ip: 120, per_token: 300 } }
}

// ─── In-process implementation ───────────────────────────────────────────────

#[derive(Debug)]
struct Counter {
  window: i64,
  count:  u32,
}

#[derive(Debug, Default)]
struct WindowState {
  counters:   HashMap<(RateScope, String), Counter>,
  last_sweep: i64,
}

/// Counters keyed by `(scope, key)`, each tagged with the window index
/// `floor(now / window_secs)` it counts for. A counter from an older window is
/// replaced on first use in the new one, and stale counters are swept at most
/// once per window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
  config: RateLimitConfig,
  state:  Mutex<WindowState>,
}

impl FixedWindowLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    Self {
      config: RateLimitConfig { window_secs: config.window_secs.max(1), ..config },
      state:  Mutex::new(WindowState::default()),
    }
  }

  fn limit(&self, scope: RateScope) -> u32 {
    match scope {
      RateScope::Ip => self.config.per_ip,
      RateScope::Token => self.config.per_token,
    }
  }

  /// Number of live counters; exposed for tests and diagnostics.
  pub fn tracked_keys(&self) -> usize {
    self.state.lock().map(|s| s.counters.len()).unwrap_or(0)
  }
}

impl RateLimiter for FixedWindowLimiter {
  fn check(&self, scope: RateScope, key: &str, now: DateTime<Utc>) -> Admission {
    let window_secs = i64::try_from(self.config.window_secs).unwrap_or(i64::MAX);
    let secs = now.timestamp();
    let window = secs.div_euclid(window_secs);
    let limit = self.limit(scope);

    let Ok(mut state) = self.state.lock() else {
      tracing::error!("rate limiter lock poisoned; admitting request");
      return Admission::Admitted;
    };

    if state.last_sweep != window {
      state.counters.retain(|_, c| c.window == window);
      state.last_sweep = window;
    }

    let counter = state
      .counters
      .entry((scope, key.to_owned()))
      .or_insert(Counter { window, count: 0 });
    if counter.window != window {
      *counter = Counter { window, count: 0 };
    }

    if counter.count >= limit {
      let elapsed = secs.rem_euclid(window_secs);
      let retry_after_secs = u64::try_from(window_secs - elapsed).unwrap_or(1);
      return Admission::Limited { retry_after_secs };
    }
    counter.count += 1;
    Admission::Admitted
  }
}
