//! The canonical event model.
//!
//! Normalizers produce a [`NormalizedEvent`], a draft whose numeric fields may
//! still be missing or malformed. The validator turns a draft into a
//! [`CanonicalEvent`], which is fully typed and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency assumed when the source omits one.
pub const DEFAULT_CURRENCY: &str = "USD";

// ─── Provider ────────────────────────────────────────────────────────────────

/// The upstream shape a payload was recognised as. Informational once the
/// event is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
  Stripe,
  Paddle,
  Lemon,
  Shopify,
  Custom,
}

impl Provider {
  /// The discriminant string stored in the `provider` column.
  /// Must match the `rename_all = "lowercase"` serde tags above.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Stripe => "stripe",
      Self::Paddle => "paddle",
      Self::Lemon => "lemon",
      Self::Shopify => "shopify",
      Self::Custom => "custom",
    }
  }

  pub fn from_str_opt(s: &str) -> Option<Self> {
    match s {
      "stripe" => Some(Self::Stripe),
      "paddle" => Some(Self::Paddle),
      "lemon" => Some(Self::Lemon),
      "shopify" => Some(Self::Shopify),
      "custom" => Some(Self::Custom),
      _ => None,
    }
  }
}

impl std::fmt::Display for Provider {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Event type ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
  #[default]
  Purchase,
  OptIn,
  Booking,
  Quiz,
  Custom,
}

impl EventType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Purchase => "purchase",
      Self::OptIn => "opt_in",
      Self::Booking => "booking",
      Self::Quiz => "quiz",
      Self::Custom => "custom",
    }
  }

  /// Lenient parse of submitter-supplied text. Separators and case are
  /// ignored; anything unrecognised is [`EventType::Custom`].
  pub fn parse_lenient(s: &str) -> Self {
    let folded: String = s
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_lowercase())
      .collect();
    match folded.as_str() {
      "purchase" => Self::Purchase,
      "optin" => Self::OptIn,
      "booking" => Self::Booking,
      "quiz" => Self::Quiz,
      _ => Self::Custom,
    }
  }
}

// ─── Draft numerics ──────────────────────────────────────────────────────────

/// The outcome of coercing a loosely-typed numeric field.
///
/// Normalizers never fail; a value that cannot be represented as an integer is
/// carried as [`Numeric::Invalid`] so the validator can reject it by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Numeric {
  #[default]
  Missing,
  Int(i64),
  Invalid,
}

impl Numeric {
  /// Substitute `default` for a missing value; invalid stays invalid.
  pub fn or(self, default: i64) -> Self {
    match self {
      Self::Missing => Self::Int(default),
      other => other,
    }
  }

  pub fn is_missing(&self) -> bool { matches!(self, Self::Missing) }
}

// ─── Draft records ───────────────────────────────────────────────────────────

/// A line item as emitted by a normalizer. There is deliberately no
/// `product_ref`: only the attribution matcher assigns one.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
  pub name:              Option<String>,
  pub quantity:          Numeric,
  pub unit_amount_cents: Numeric,
  pub currency:          String,
  pub is_bump:           bool,
}

/// A normalizer's best-effort reading of a payload, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
  pub provider:          Provider,
  pub provider_event_id: String,
  pub event_type:        EventType,
  /// `None` when the source carried a timestamp that could not be parsed.
  /// Absent timestamps are already defaulted to arrival time.
  pub occurred_at:       Option<DateTime<Utc>>,
  pub currency:          String,
  pub subtotal_cents:    Numeric,
  pub discount_cents:    Numeric,
  pub tax_cents:         Numeric,
  pub total_cents:       Numeric,
  pub items:             Vec<NormalizedItem>,
  pub customer_ref:      Option<String>,
  pub session_ref:       Option<String>,
  pub visitor_ref:       Option<String>,
  pub extra:             serde_json::Map<String, serde_json::Value>,
}

// ─── Canonical records ───────────────────────────────────────────────────────

/// One purchased unit-group within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
  pub name:              Option<String>,
  pub quantity:          u32,
  pub unit_amount_cents: i64,
  pub currency:          String,
  pub is_bump:           bool,
  /// Catalog product this item was attributed to, if any.
  pub product_ref:       Option<String>,
}

/// The normalized, provider-independent representation of one inbound
/// occurrence. Constructed by [`crate::validate::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
  pub provider:          Provider,
  pub provider_event_id: String,
  pub event_type:        EventType,
  pub occurred_at:       DateTime<Utc>,
  pub currency:          String,
  pub subtotal_cents:    i64,
  pub discount_cents:    i64,
  pub tax_cents:         i64,
  pub total_cents:       i64,
  pub items:             Vec<LineItem>,
  pub customer_ref:      Option<String>,
  pub session_ref:       Option<String>,
  pub visitor_ref:       Option<String>,
  pub extra:             serde_json::Map<String, serde_json::Value>,
}

// ─── Persistence keys ────────────────────────────────────────────────────────

/// The tuple under which exactly one event row may exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
  pub workspace_id:      String,
  pub provider:          Provider,
  pub provider_event_id: String,
  pub occurred_at:       DateTime<Utc>,
}

impl DedupKey {
  pub fn for_event(workspace_id: &str, event: &CanonicalEvent) -> Self {
    Self {
      workspace_id:      workspace_id.to_owned(),
      provider:          event.provider,
      provider_event_id: event.provider_event_id.clone(),
      occurred_at:       event.occurred_at,
    }
  }
}

/// The identity of a persisted event row. `occurred_at` is the canonical
/// timestamp as stored and is part of the item rows' composite key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
  pub event_id:    Uuid,
  pub occurred_at: DateTime<Utc>,
}

/// Read model of a persisted event and its items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
  pub event_id:          Uuid,
  pub workspace_id:      String,
  pub node_id:           String,
  pub provider:          Provider,
  pub provider_event_id: String,
  pub event_type:        EventType,
  pub occurred_at:       DateTime<Utc>,
  pub received_at:       DateTime<Utc>,
  pub currency:          String,
  pub subtotal_cents:    i64,
  pub discount_cents:    i64,
  pub tax_cents:         i64,
  pub total_cents:       i64,
  pub customer_ref:      Option<String>,
  pub session_ref:       Option<String>,
  pub visitor_ref:       Option<String>,
  pub extra:             serde_json::Value,
  pub items:             Vec<LineItem>,
}
