//! The custom shape: submitters write canonical fields directly.
//!
//! Every `*_cents` field is an integer read literally; there is no unit
//! inference. Item currency falls back to the event currency.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{EventType, NormalizedEvent, NormalizedItem, Numeric, Provider};

use crate::{
  coerce::{self, Stamp, field},
  random_event_id,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
  pub provider_event_id: Option<String>,
  pub event_type:        Option<String>,
  pub occurred_at:       Stamp,
  pub currency:          String,
  pub subtotal_cents:    Numeric,
  pub discount_cents:    Numeric,
  pub tax_cents:         Numeric,
  pub total_cents:       Numeric,
  pub items:             Vec<CustomItem>,
  pub customer_ref:      Option<String>,
  pub session_ref:       Option<String>,
  pub visitor_ref:       Option<String>,
  pub extra:             Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomItem {
  pub name:              Option<String>,
  pub quantity:          Numeric,
  pub unit_amount_cents: Numeric,
  pub currency:          Option<String>,
  pub is_bump:           bool,
}

impl CustomItem {
  fn from_value(value: &Value) -> Self {
    let Some(obj) = value.as_object() else {
      return Self {
        name:              None,
        quantity:          Numeric::Invalid,
        unit_amount_cents: Numeric::Invalid,
        currency:          None,
        is_bump:           false,
      };
    };
    Self {
      name:              coerce::string(field(obj, "name")),
      quantity:          coerce::integer(field(obj, "quantity")),
      unit_amount_cents: coerce::integer(field(obj, "unit_amount_cents")),
      currency:          coerce::currency_code(field(obj, "currency")),
      is_bump:           coerce::flag(field(obj, "is_bump")),
    }
  }
}

impl CustomEvent {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    let cents = |key: &str| coerce::integer(field(obj, key));
    let extra = field(obj, "extra")
      .or_else(|| field(obj, "metadata"))
      .and_then(Value::as_object)
      .cloned()
      .unwrap_or_default();
    let items = field(obj, "items")
      .and_then(Value::as_array)
      .map(|items| items.iter().map(CustomItem::from_value).collect())
      .unwrap_or_default();

    Self {
      provider_event_id: coerce::string(field(obj, "provider_event_id")),
      event_type: coerce::string(field(obj, "type"))
        .or_else(|| coerce::string(field(obj, "event_type"))),
      occurred_at: coerce::timestamp(field(obj, "occurred_at")),
      currency: coerce::currency(field(obj, "currency")),
      subtotal_cents: cents("subtotal_cents"),
      discount_cents: cents("discount_cents"),
      tax_cents: cents("tax_cents"),
      total_cents: cents("total_cents"),
      items,
      customer_ref: coerce::string(field(obj, "customer_ref")),
      session_ref: coerce::string(field(obj, "session_ref")),
      visitor_ref: coerce::string(field(obj, "visitor_ref")),
      extra,
    }
  }

  /// The total stays [`Numeric::Missing`] when absent so the validator can
  /// reject it by name.
  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    let currency = self.currency;
    let items = self
      .items
      .into_iter()
      .map(|item| NormalizedItem {
        name:              item.name,
        quantity:          item.quantity,
        unit_amount_cents: item.unit_amount_cents,
        currency:          item.currency.unwrap_or_else(|| currency.clone()),
        is_bump:           item.is_bump,
      })
      .collect();

    NormalizedEvent {
      provider: Provider::Custom,
      provider_event_id: self.provider_event_id.unwrap_or_else(random_event_id),
      event_type: self
        .event_type
        .as_deref()
        .map(EventType::parse_lenient)
        .unwrap_or_default(),
      occurred_at: self.occurred_at.resolve(arrival),
      currency,
      subtotal_cents: self.subtotal_cents,
      discount_cents: self.discount_cents,
      tax_cents: self.tax_cents,
      total_cents: self.total_cents,
      items,
      customer_ref: self.customer_ref,
      session_ref: self.session_ref,
      visitor_ref: self.visitor_ref,
      extra: self.extra,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn arrival() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

  fn draft(v: Value) -> NormalizedEvent {
    CustomEvent::from_object(v.as_object().unwrap()).into_draft(arrival())
  }

  #[test]
  fn fields_map_directly() {
    let ev = draft(json!({
      "provider": "custom",
      "type": "purchase",
      "provider_event_id": "order_123",
      "currency": "USD",
      "total_cents": 9900,
      "items": [{"name": "Pro", "quantity": 1, "unit_amount_cents": 9900}]
    }));
    assert_eq!(ev.provider, Provider::Custom);
    assert_eq!(ev.provider_event_id, "order_123");
    assert_eq!(ev.event_type, EventType::Purchase);
    assert_eq!(ev.total_cents, Numeric::Int(9900));
    assert_eq!(ev.subtotal_cents, Numeric::Missing);
    assert_eq!(ev.occurred_at, Some(arrival()));
    assert_eq!(ev.items.len(), 1);
    assert_eq!(ev.items[0].name.as_deref(), Some("Pro"));
    assert_eq!(ev.items[0].quantity, Numeric::Int(1));
    assert_eq!(ev.items[0].unit_amount_cents, Numeric::Int(9900));
    assert_eq!(ev.items[0].currency, "USD");
  }

  #[test]
  fn no_unit_inference_on_custom_amounts() {
    let ev = draft(json!({"total_cents": 49}));
    assert_eq!(ev.total_cents, Numeric::Int(49));
    let ev = draft(json!({"total_cents": "49.99"}));
    assert_eq!(ev.total_cents, Numeric::Invalid);
  }

  #[test]
  fn missing_total_is_left_for_the_validator() {
    let ev = draft(json!({"items": []}));
    assert_eq!(ev.total_cents, Numeric::Missing);
  }

  #[test]
  fn item_currency_inherits_from_event() {
    let ev = draft(json!({
      "currency": "eur",
      "total_cents": 300,
      "items": [
        {"unit_amount_cents": 100},
        {"unit_amount_cents": 200, "currency": "gbp", "is_bump": true}
      ]
    }));
    assert_eq!(ev.items[0].currency, "EUR");
    assert_eq!(ev.items[0].quantity, Numeric::Missing);
    assert_eq!(ev.items[1].currency, "GBP");
    assert!(ev.items[1].is_bump);
  }

  #[test]
  fn event_type_alias_and_extra() {
    let ev = draft(json!({
      "event_type": "opt-in",
      "total_cents": 0,
      "customer_ref": "cust_1",
      "session_ref": "s",
      "visitor_ref": "v",
      "metadata": {"campaign": "spring"}
    }));
    assert_eq!(ev.event_type, EventType::OptIn);
    assert_eq!(ev.customer_ref.as_deref(), Some("cust_1"));
    assert_eq!(ev.extra["campaign"], json!("spring"));
  }

  #[test]
  fn bad_quantity_and_timestamp_are_carried_through() {
    let ev = draft(json!({
      "total_cents": 100,
      "occurred_at": "soon",
      "items": [{"quantity": "lots", "unit_amount_cents": 100}]
    }));
    assert_eq!(ev.items[0].quantity, Numeric::Invalid);
    assert_eq!(ev.occurred_at, None);
  }
}
