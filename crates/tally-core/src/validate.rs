//! Bounds, type and staleness checks that turn a [`NormalizedEvent`] draft
//! into a [`CanonicalEvent`].
//!
//! Validation is total: every outcome is either an event or a [`Rejection`]
//! carrying a machine-readable reason code. Checks run in a fixed order and the
//! first failure wins:
//!
//! 1. body size and item count ceilings
//! 2. event-level cents fields
//! 3. per-item amount and quantity
//! 4. staleness of `occurred_at`

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::event::{CanonicalEvent, LineItem, NormalizedEvent, Numeric};

// ─── Limits ──────────────────────────────────────────────────────────────────

/// Configurable ceilings applied to every inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
  /// Maximum absolute value of any cents field.
  pub cents_cap:      i64,
  pub max_items:      usize,
  pub max_quantity:   i64,
  pub max_body_bytes: usize,
  /// Events older than this (relative to arrival) are rejected.
  pub max_age_secs:   i64,
}

impl Default for Limits {
  fn default() -> Self {
    Self {
      cents_cap:      100_000_000,
      max_items:      100,
      max_quantity:   1000,
      max_body_bytes: 64 * 1024,
      max_age_secs:   7 * 24 * 60 * 60,
    }
  }
}

impl Limits {
  pub fn max_age(&self) -> Duration { Duration::seconds(self.max_age_secs) }
}

// ─── Rejection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  #[error("payload of {len} bytes exceeds the {max} byte limit")]
  PayloadTooLarge { len: usize, max: usize },

  #[error("{count} items exceeds the limit of {max}")]
  TooManyItems { count: usize, max: usize },

  #[error("total_cents is required")]
  MissingTotal,

  #[error("{field} must be an integer number of cents")]
  InvalidAmount { field: String },

  #[error("{field} = {value} exceeds the absolute limit of {cap}")]
  AmountOutOfRange { field: String, value: i64, cap: i64 },

  #[error("items[{index}].quantity must be an integer")]
  InvalidQuantity { index: usize },

  #[error("items[{index}].quantity = {value} is outside 1..={max}")]
  QuantityOutOfRange { index: usize, value: i64, max: i64 },

  #[error("event occurred at {occurred_at}, older than {max_age_secs}s")]
  Stale {
    occurred_at:  DateTime<Utc>,
    max_age_secs: i64,
  },
}

impl Rejection {
  /// Stable machine-readable reason code.
  pub fn reason(&self) -> &'static str {
    match self {
      Self::PayloadTooLarge { .. } => "payload_too_large",
      Self::TooManyItems { .. } => "too_many_items",
      Self::MissingTotal => "missing_total",
      Self::InvalidAmount { .. } => "invalid_amount",
      Self::AmountOutOfRange { .. } => "amount_out_of_range",
      Self::InvalidQuantity { .. } => "invalid_quantity",
      Self::QuantityOutOfRange { .. } => "quantity_out_of_range",
      Self::Stale { .. } => "event_too_old",
    }
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Validate a draft event.
///
/// - `body_len`: size in bytes of the raw payload the draft came from.
/// - `now`: arrival time; also substituted for an unparseable `occurred_at`.
pub fn validate(
  draft: NormalizedEvent,
  body_len: usize,
  now: DateTime<Utc>,
  limits: &Limits,
) -> Result<CanonicalEvent, Rejection> {
  if body_len > limits.max_body_bytes {
    return Err(Rejection::PayloadTooLarge {
      len: body_len,
      max: limits.max_body_bytes,
    });
  }
  if draft.items.len() > limits.max_items {
    return Err(Rejection::TooManyItems {
      count: draft.items.len(),
      max:   limits.max_items,
    });
  }

  if draft.total_cents.is_missing() {
    return Err(Rejection::MissingTotal);
  }
  let subtotal_cents = cents("subtotal_cents", draft.subtotal_cents.or(0), limits)?;
  let discount_cents = cents("discount_cents", draft.discount_cents.or(0), limits)?;
  let tax_cents = cents("tax_cents", draft.tax_cents.or(0), limits)?;
  let total_cents = cents("total_cents", draft.total_cents, limits)?;

  let mut items = Vec::with_capacity(draft.items.len());
  for (index, item) in draft.items.into_iter().enumerate() {
    let unit_amount_cents = cents(
      &format!("items[{index}].unit_amount_cents"),
      item.unit_amount_cents,
      limits,
    )?;
    let quantity = quantity(index, item.quantity, limits)?;
    items.push(LineItem {
      name: item.name,
      quantity,
      unit_amount_cents,
      currency: item.currency,
      is_bump: item.is_bump,
      product_ref: None,
    });
  }

  let occurred_at = match draft.occurred_at {
    Some(at) => {
      if now.signed_duration_since(at) > limits.max_age() {
        return Err(Rejection::Stale {
          occurred_at:  at,
          max_age_secs: limits.max_age_secs,
        });
      }
      at
    }
    None => {
      tracing::debug!(
        provider_event_id = %draft.provider_event_id,
        "unparseable occurred_at; defaulting to arrival time"
      );
      now
    }
  };

  Ok(CanonicalEvent {
    provider: draft.provider,
    provider_event_id: draft.provider_event_id,
    event_type: draft.event_type,
    occurred_at,
    currency: draft.currency,
    subtotal_cents,
    discount_cents,
    tax_cents,
    total_cents,
    items,
    customer_ref: draft.customer_ref,
    session_ref: draft.session_ref,
    visitor_ref: draft.visitor_ref,
    extra: draft.extra,
  })
}

fn cents(field: &str, value: Numeric, limits: &Limits) -> Result<i64, Rejection> {
  match value {
    Numeric::Int(v) if v.unsigned_abs() <= limits.cents_cap.unsigned_abs() => Ok(v),
    Numeric::Int(v) => Err(Rejection::AmountOutOfRange {
      field: field.to_owned(),
      value: v,
      cap:   limits.cents_cap,
    }),
    Numeric::Missing | Numeric::Invalid => Err(Rejection::InvalidAmount {
      field: field.to_owned(),
    }),
  }
}

fn quantity(index: usize, value: Numeric, limits: &Limits) -> Result<u32, Rejection> {
  match value.or(1) {
    Numeric::Int(v) if (1..=limits.max_quantity).contains(&v) => {
      u32::try_from(v).map_err(|_| Rejection::QuantityOutOfRange {
        index,
        value: v,
        max: limits.max_quantity,
      })
    }
    Numeric::Int(v) => Err(Rejection::QuantityOutOfRange {
      index,
      value: v,
      max: limits.max_quantity,
    }),
    Numeric::Missing | Numeric::Invalid => Err(Rejection::InvalidQuantity { index }),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::event::{EventType, NormalizedItem, Provider};

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

  fn draft() -> NormalizedEvent {
    NormalizedEvent {
      provider:          Provider::Custom,
      provider_event_id: "order_123".into(),
      event_type:        EventType::Purchase,
      occurred_at:       Some(now()),
      currency:          "USD".into(),
      subtotal_cents:    Numeric::Missing,
      discount_cents:    Numeric::Missing,
      tax_cents:         Numeric::Missing,
      total_cents:       Numeric::Int(9900),
      items:             vec![item(Numeric::Int(1), Numeric::Int(9900))],
      customer_ref:      None,
      session_ref:       None,
      visitor_ref:       None,
      extra:             serde_json::Map::new(),
    }
  }

  fn item(quantity: Numeric, amount: Numeric) -> NormalizedItem {
    NormalizedItem {
      name: Some("Pro".into()),
      quantity,
      unit_amount_cents: amount,
      currency: "USD".into(),
      is_bump: false,
    }
  }

  fn check(d: NormalizedEvent) -> Result<CanonicalEvent, Rejection> {
    validate(d, 100, now(), &Limits::default())
  }

  #[test]
  fn accepts_well_formed_draft_and_defaults_optional_cents() {
    let ev = check(draft()).unwrap();
    assert_eq!(ev.total_cents, 9900);
    assert_eq!(ev.subtotal_cents, 0);
    assert_eq!(ev.discount_cents, 0);
    assert_eq!(ev.tax_cents, 0);
    assert_eq!(ev.items.len(), 1);
    assert_eq!(ev.items[0].quantity, 1);
    assert!(ev.items[0].product_ref.is_none());
  }

  #[test]
  fn cents_cap_is_inclusive() {
    let mut d = draft();
    d.total_cents = Numeric::Int(100_000_000);
    d.discount_cents = Numeric::Int(-100_000_000);
    assert!(check(d).is_ok());
  }

  #[test]
  fn cents_beyond_cap_rejected_for_every_field() {
    for field in ["subtotal_cents", "discount_cents", "tax_cents", "total_cents"] {
      for value in [100_000_001, -100_000_001] {
        let mut d = draft();
        let slot = match field {
          "subtotal_cents" => &mut d.subtotal_cents,
          "discount_cents" => &mut d.discount_cents,
          "tax_cents" => &mut d.tax_cents,
          _ => &mut d.total_cents,
        };
        *slot = Numeric::Int(value);
        let err = check(d).unwrap_err();
        assert_eq!(err.reason(), "amount_out_of_range", "{field}={value}");
        assert!(matches!(err, Rejection::AmountOutOfRange { field: ref f, .. } if f == field));
      }
    }
  }

  #[test]
  fn item_amount_beyond_cap_rejected() {
    let mut d = draft();
    d.items = vec![item(Numeric::Int(1), Numeric::Int(i64::MIN))];
    let err = check(d).unwrap_err();
    assert_eq!(err.reason(), "amount_out_of_range");
  }

  #[test]
  fn missing_total_rejected() {
    let mut d = draft();
    d.total_cents = Numeric::Missing;
    assert_eq!(check(d).unwrap_err(), Rejection::MissingTotal);
  }

  #[test]
  fn non_integer_amount_rejected() {
    let mut d = draft();
    d.tax_cents = Numeric::Invalid;
    assert_eq!(
      check(d).unwrap_err(),
      Rejection::InvalidAmount { field: "tax_cents".into() }
    );
  }

  #[test]
  fn quantity_bounds() {
    for (q, ok) in [(0, false), (1, true), (1000, true), (1001, false), (-3, false)] {
      let mut d = draft();
      d.items = vec![item(Numeric::Int(q), Numeric::Int(100))];
      let res = check(d);
      assert_eq!(res.is_ok(), ok, "quantity {q}");
      if !ok {
        assert_eq!(res.unwrap_err().reason(), "quantity_out_of_range");
      }
    }
  }

  #[test]
  fn missing_quantity_defaults_to_one_but_invalid_is_rejected() {
    let mut d = draft();
    d.items = vec![item(Numeric::Missing, Numeric::Int(100))];
    assert_eq!(check(d).unwrap().items[0].quantity, 1);

    let mut d = draft();
    d.items = vec![
      item(Numeric::Int(1), Numeric::Int(100)),
      item(Numeric::Invalid, Numeric::Int(100)),
    ];
    assert_eq!(check(d).unwrap_err(), Rejection::InvalidQuantity { index: 1 });
  }

  #[test]
  fn too_many_items_rejected() {
    let mut d = draft();
    d.items = (0..101).map(|_| item(Numeric::Int(1), Numeric::Int(1))).collect();
    assert_eq!(check(d).unwrap_err().reason(), "too_many_items");

    let mut d = draft();
    d.items = (0..100).map(|_| item(Numeric::Int(1), Numeric::Int(1))).collect();
    assert!(check(d).is_ok());
  }

  #[test]
  fn body_size_checked_first() {
    let mut d = draft();
    d.total_cents = Numeric::Invalid;
    let err = validate(d, 64 * 1024 + 1, now(), &Limits::default()).unwrap_err();
    assert_eq!(err.reason(), "payload_too_large");
  }

  #[test]
  fn staleness_window() {
    let mut d = draft();
    d.occurred_at = Some(now() - Duration::days(8));
    assert_eq!(check(d).unwrap_err().reason(), "event_too_old");

    let mut d = draft();
    d.occurred_at = Some(now() - Duration::days(6));
    assert!(check(d).is_ok());
  }

  #[test]
  fn unparseable_timestamp_defaults_to_arrival() {
    let mut d = draft();
    d.occurred_at = None;
    assert_eq!(check(d).unwrap().occurred_at, now());
  }
}
