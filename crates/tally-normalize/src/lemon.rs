//! Lemon-like JSON:API envelopes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{EventType, NormalizedEvent, Numeric, Provider};

use crate::{
  coerce::{self, Stamp, path_in},
  random_event_id,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LemonEvent {
  pub id:           Option<String>,
  pub event_name:   Option<String>,
  pub created_at:   Stamp,
  /// `data.attributes.total`, already in cents.
  pub total:        Numeric,
  pub currency:     String,
  pub customer_ref: Option<String>,
  pub session_ref:  Option<String>,
  pub visitor_ref:  Option<String>,
}

impl LemonEvent {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    let attr = |key: &str| path_in(obj, &["data", "attributes", key]);
    let custom = |key: &str| path_in(obj, &["meta", "custom_data", key]);

    Self {
      id: coerce::string(path_in(obj, &["data", "id"]))
        .or_else(|| coerce::string(attr("identifier"))),
      event_name: coerce::string(path_in(obj, &["meta", "event_name"])),
      created_at: coerce::timestamp(attr("created_at")),
      total: coerce::integer(attr("total")),
      currency: coerce::currency(attr("currency")),
      customer_ref: coerce::string(attr("user_email"))
        .or_else(|| coerce::string(attr("customer_id"))),
      session_ref: coerce::string(custom("session_id")),
      visitor_ref: coerce::string(custom("visitor_id")),
    }
  }

  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    let mut extra = Map::new();
    if let Some(name) = self.event_name {
      extra.insert("event_name".into(), Value::String(name));
    }

    NormalizedEvent {
      provider:          Provider::Lemon,
      provider_event_id: self.id.unwrap_or_else(random_event_id),
      event_type:        EventType::Purchase,
      occurred_at:       self.created_at.resolve(arrival),
      currency:          self.currency,
      subtotal_cents:    Numeric::Missing,
      discount_cents:    Numeric::Missing,
      tax_cents:         Numeric::Missing,
      total_cents:       self.total.or(0),
      items:             Vec::new(),
      customer_ref:      self.customer_ref,
      session_ref:       self.session_ref,
      visitor_ref:       self.visitor_ref,
      extra,
    }
  }
}
