//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a `Z` suffix and
//! microsecond precision, so equal instants always encode to equal text (the
//! events unique key depends on it). UUIDs are hyphenated lowercase strings.
//! Price points and `extra` are compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use tally_core::{
  catalog::ProductMapping,
  event::{EventType, LineItem, Provider, RecordedEvent},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Provider / EventType
// ─────────────────────────────────────────────────────

pub fn decode_provider(s: &str) -> Result<Provider> {
  Provider::from_str_opt(s).ok_or_else(|| Error::UnknownVariant {
    kind:  "provider",
    value: s.to_owned(),
  })
}

pub fn decode_event_type(s: &str) -> Result<EventType> {
  match s {
    "purchase" => Ok(EventType::Purchase),
    "opt_in" => Ok(EventType::OptIn),
    "booking" => Ok(EventType::Booking),
    "quiz" => Ok(EventType::Quiz),
    "custom" => Ok(EventType::Custom),
    other => Err(Error::UnknownVariant { kind: "event type", value: other.to_owned() }),
  }
}

// ─── Price points ────────────────────────────────────────────────────────────

pub fn encode_price_points(points: &[i64]) -> Result<String> {
  Ok(serde_json::to_string(points)?)
}

pub fn decode_price_points(s: &str) -> Result<Vec<i64>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `products` row.
pub struct RawProduct {
  pub product_id:   String,
  pub name:         Option<String>,
  pub price_points: String,
  pub is_primary:   bool,
}

impl RawProduct {
  pub fn into_mapping(self) -> Result<ProductMapping> {
    Ok(ProductMapping {
      product_id:         self.product_id,
      name:               self.name,
      price_points_cents: decode_price_points(&self.price_points)?,
      is_primary:         self.is_primary,
    })
  }
}

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub event_id:          String,
  pub workspace_id:      String,
  pub node_id:           String,
  pub provider:          String,
  pub provider_event_id: String,
  pub event_type:        String,
  pub occurred_at:       String,
  pub received_at:       String,
  pub currency:          String,
  pub subtotal_cents:    i64,
  pub discount_cents:    i64,
  pub tax_cents:         i64,
  pub total_cents:       i64,
  pub customer_ref:      Option<String>,
  pub session_ref:       Option<String>,
  pub visitor_ref:       Option<String>,
  pub extra:             String,
}

impl RawEvent {
  pub fn into_recorded(self, items: Vec<LineItem>) -> Result<RecordedEvent> {
    Ok(RecordedEvent {
      event_id: decode_uuid(&self.event_id)?,
      workspace_id: self.workspace_id,
      node_id: self.node_id,
      provider: decode_provider(&self.provider)?,
      provider_event_id: self.provider_event_id,
      event_type: decode_event_type(&self.event_type)?,
      occurred_at: decode_dt(&self.occurred_at)?,
      received_at: decode_dt(&self.received_at)?,
      currency: self.currency,
      subtotal_cents: self.subtotal_cents,
      discount_cents: self.discount_cents,
      tax_cents: self.tax_cents,
      total_cents: self.total_cents,
      customer_ref: self.customer_ref,
      session_ref: self.session_ref,
      visitor_ref: self.visitor_ref,
      extra: serde_json::from_str(&self.extra)?,
      items,
    })
  }
}

/// Raw values read directly from an `event_items` row.
pub struct RawItem {
  pub name:              Option<String>,
  pub quantity:          i64,
  pub unit_amount_cents: i64,
  pub currency:          String,
  pub is_bump:           bool,
  pub product_ref:       Option<String>,
}

impl RawItem {
  pub fn into_item(self) -> Result<LineItem> {
    Ok(LineItem {
      name:              self.name,
      quantity:          u32::try_from(self.quantity)
        .map_err(|_| Error::QuantityRange(self.quantity))?,
      unit_amount_cents: self.unit_amount_cents,
      currency:          self.currency,
      is_bump:           self.is_bump,
      product_ref:       self.product_ref,
    })
  }
}
