//! Paddle-like alerts (classic form-post style fields, submitted as JSON).

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{EventType, NormalizedEvent, Numeric, Provider};

use crate::{
  coerce::{self, Stamp, field},
  random_event_id,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PaddleAlert {
  pub alert_id:     Option<String>,
  pub alert_name:   Option<String>,
  pub order_id:     Option<String>,
  pub event_time:   Stamp,
  pub amount:       Numeric,
  pub currency:     String,
  pub customer_ref: Option<String>,
  pub passthrough:  Map<String, Value>,
}

impl PaddleAlert {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    let amount = ["sale_gross", "total", "amount"]
      .iter()
      .map(|key| coerce::inferred_cents(field(obj, key)))
      .find(|n| !n.is_missing())
      .unwrap_or(Numeric::Missing);

    let currency = field(obj, "currency")
      .or_else(|| field(obj, "balance_currency"));

    Self {
      alert_id: coerce::string(field(obj, "alert_id")),
      alert_name: coerce::string(field(obj, "alert_name")),
      order_id: coerce::string(field(obj, "order_id")),
      event_time: coerce::timestamp(field(obj, "event_time")),
      amount,
      currency: coerce::currency(currency),
      customer_ref: coerce::string(field(obj, "customer_email"))
        .or_else(|| coerce::string(field(obj, "user_id"))),
      passthrough: passthrough(field(obj, "passthrough")),
    }
  }

  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    let mut extra = Map::new();
    if let Some(name) = self.alert_name {
      extra.insert("alert_name".into(), Value::String(name));
    }
    if let Some(order_id) = &self.order_id {
      extra.insert("order_id".into(), Value::String(order_id.clone()));
    }

    NormalizedEvent {
      provider:          Provider::Paddle,
      provider_event_id: self
        .alert_id
        .or(self.order_id)
        .unwrap_or_else(random_event_id),
      event_type:        EventType::Purchase,
      occurred_at:       self.event_time.resolve(arrival),
      currency:          self.currency,
      subtotal_cents:    Numeric::Missing,
      discount_cents:    Numeric::Missing,
      tax_cents:         Numeric::Missing,
      total_cents:       self.amount.or(0),
      items:             Vec::new(),
      customer_ref:      self.customer_ref,
      session_ref:       coerce::string(field(&self.passthrough, "session_id")),
      visitor_ref:       coerce::string(field(&self.passthrough, "visitor_id")),
      extra,
    }
  }
}

/// `passthrough` is merchant-controlled: an object, a JSON-encoded object, or
/// arbitrary text. Only the first two carry correlation refs.
fn passthrough(value: Option<&Value>) -> Map<String, Value> {
  match value {
    Some(Value::Object(obj)) => obj.clone(),
    Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
      Ok(Value::Object(obj)) => obj,
      _ => Map::new(),
    },
    _ => Map::new(),
  }
}
