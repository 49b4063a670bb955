//! Provider detection and normalization for Tally.
//!
//! Turns a raw JSON payload into a [`NormalizedEvent`] draft. Pure and
//! synchronous; no HTTP or database dependencies. Normalizers never fail on
//! malformed fields; rejection is the validator's job (see
//! [`tally_core::validate`]).
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Utc;
//! use tally_normalize::normalize;
//!
//! let payload = serde_json::json!({"total_cents": 9900, "provider_event_id": "order_123"});
//! let draft = normalize(&payload, Utc::now()).unwrap();
//! println!("{} {:?}", draft.provider, draft.total_cents);
//! ```

pub mod coerce;
pub mod custom;
pub mod detect;
pub mod error;
pub mod lemon;
pub mod paddle;
pub mod shopify;
pub mod stripe;

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use tally_core::event::{NormalizedEvent, Provider};

pub use detect::{Shape, detect};
pub use error::{Error, Result};

use crate::{
  custom::CustomEvent, lemon::LemonEvent, paddle::PaddleAlert, shopify::ShopifyOrder,
  stripe::StripeEvent,
};

// ─── Recognized payloads ─────────────────────────────────────────────────────

/// A payload read into the record type of its detected shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognized {
  Stripe(StripeEvent),
  Paddle(PaddleAlert),
  Lemon(LemonEvent),
  Shopify(ShopifyOrder),
  Custom(CustomEvent),
}

impl Recognized {
  /// Detect the shape of `value` and extract its fields.
  pub fn from_value(value: &Value) -> Result<Self> {
    let shape = detect(value);
    let Some(obj) = value.as_object() else {
      return Err(Error::Unsupported);
    };
    Ok(match shape {
      Shape::Stripe => Self::Stripe(StripeEvent::from_object(obj)),
      Shape::Paddle => Self::Paddle(PaddleAlert::from_object(obj)),
      Shape::Lemon => Self::Lemon(LemonEvent::from_object(obj)),
      Shape::Shopify => Self::Shopify(ShopifyOrder::from_object(obj)),
      Shape::Custom => Self::Custom(CustomEvent::from_object(obj)),
      Shape::Unsupported => return Err(Error::Unsupported),
    })
  }

  pub fn provider(&self) -> Provider {
    match self {
      Self::Stripe(_) => Provider::Stripe,
      Self::Paddle(_) => Provider::Paddle,
      Self::Lemon(_) => Provider::Lemon,
      Self::Shopify(_) => Provider::Shopify,
      Self::Custom(_) => Provider::Custom,
    }
  }

  /// Build the draft event. Absent timestamps resolve to `arrival`.
  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    match self {
      Self::Stripe(e) => e.into_draft(arrival),
      Self::Paddle(e) => e.into_draft(arrival),
      Self::Lemon(e) => e.into_draft(arrival),
      Self::Shopify(e) => e.into_draft(arrival),
      Self::Custom(e) => e.into_draft(arrival),
    }
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Detect and normalize in one step.
///
/// # Errors
///
/// [`Error::Unsupported`] when no provider shape matches.
pub fn normalize(value: &Value, arrival: DateTime<Utc>) -> Result<NormalizedEvent> {
  Recognized::from_value(value).map(|r| r.into_draft(arrival))
}

/// A fresh 128-bit hex identifier for payloads without a stable id.
///
/// Events carrying one of these never deduplicate against a resubmission.
pub(crate) fn random_event_id() -> String {
  let mut bytes = [0u8; 16];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}
