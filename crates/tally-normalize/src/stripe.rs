//! Stripe-like event envelopes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{EventType, NormalizedEvent, Numeric, Provider};

use crate::{
  coerce::{self, Stamp, field, path_in},
  random_event_id,
};

/// The fields read from a Stripe-like envelope. Amount and currency live on
/// `data.object` for real events; the top level is consulted as a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct StripeEvent {
  pub id:           Option<String>,
  pub kind:         Option<String>,
  pub object_id:    Option<String>,
  pub created:      Stamp,
  pub amount:       Numeric,
  pub currency:     String,
  pub customer_ref: Option<String>,
  pub session_ref:  Option<String>,
  pub visitor_ref:  Option<String>,
}

/// The amount fields consulted for an event sub-type, in order.
fn amount_fields(kind: Option<&str>) -> &'static [&'static str] {
  match kind {
    Some("checkout.session.completed") => &["amount_total"],
    Some("payment_intent.succeeded") => &["amount"],
    Some("invoice.payment_succeeded") => &["total"],
    _ => &["amount_total", "amount"],
  }
}

impl StripeEvent {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    let object = path_in(obj, &["data", "object"]).and_then(Value::as_object);
    // `data.object` first, then the envelope itself.
    let lookup = |key: &str| object.and_then(|o| field(o, key)).or_else(|| field(obj, key));
    let nested = |keys: &[&str]| {
      object
        .and_then(|o| path_in(o, keys))
        .or_else(|| path_in(obj, keys))
    };

    let kind = coerce::string(field(obj, "type"));
    let amount = amount_fields(kind.as_deref())
      .iter()
      .map(|key| coerce::integer(lookup(key)))
      .find(|n| !n.is_missing())
      .unwrap_or(Numeric::Missing);

    // `customer` is an id string, or an expanded object when requested.
    let customer_id = match lookup("customer") {
      Some(Value::Object(c)) => coerce::string(field(c, "id")),
      other => coerce::string(other),
    };

    Self {
      id: coerce::string(field(obj, "id")),
      object_id: object.and_then(|o| coerce::string(field(o, "id"))),
      created: coerce::timestamp(field(obj, "created")).or(coerce::timestamp(lookup("created"))),
      amount,
      currency: coerce::currency(lookup("currency")),
      customer_ref: customer_id
        .or_else(|| coerce::string(nested(&["customer_details", "email"])))
        .or_else(|| coerce::string(lookup("customer_email"))),
      session_ref: coerce::string(nested(&["metadata", "session_id"]))
        .or_else(|| coerce::string(lookup("client_reference_id"))),
      visitor_ref: coerce::string(nested(&["metadata", "visitor_id"])),
      kind,
    }
  }

  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    let mut extra = Map::new();
    if let Some(kind) = &self.kind {
      extra.insert("stripe_type".into(), Value::String(kind.clone()));
    }
    if let Some(object_id) = self.object_id {
      extra.insert("stripe_object_id".into(), Value::String(object_id));
    }

    NormalizedEvent {
      provider:          Provider::Stripe,
      provider_event_id: self.id.unwrap_or_else(random_event_id),
      event_type:        EventType::Purchase,
      occurred_at:       self.created.resolve(arrival),
      currency:          self.currency,
      subtotal_cents:    Numeric::Missing,
      discount_cents:    Numeric::Missing,
      tax_cents:         Numeric::Missing,
      total_cents:       self.amount.or(0),
      items:             Vec::new(),
      customer_ref:      self.customer_ref,
      session_ref:       self.session_ref,
      visitor_ref:       self.visitor_ref,
      extra,
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
    StripeEvent::from_object(v.as_object().unwrap()).into_draft(arrival())
  }

  #[test]
  fn checkout_session_reads_amount_total() {
    let ev = draft(json!({
      "id": "evt_1",
      "object": "event",
      "type": "checkout.session.completed",
      "created": 1_717_243_200,
      "data": {"object": {
        "id": "cs_1",
        "amount_total": 4900,
        "amount": 1,
        "currency": "eur",
        "customer_details": {"email": "a@example.com"},
        "client_reference_id": "sess_9",
        "metadata": {"visitor_id": "v_1"}
      }}
    }));
    assert_eq!(ev.provider_event_id, "evt_1");
    assert_eq!(ev.total_cents, Numeric::Int(4900));
    assert_eq!(ev.currency, "EUR");
    assert_eq!(ev.occurred_at, Some(Utc.timestamp_opt(1_717_243_200, 0).unwrap()));
    assert_eq!(ev.customer_ref.as_deref(), Some("a@example.com"));
    assert_eq!(ev.session_ref.as_deref(), Some("sess_9"));
    assert_eq!(ev.visitor_ref.as_deref(), Some("v_1"));
    assert!(ev.items.is_empty());
    assert_eq!(ev.extra["stripe_object_id"], json!("cs_1"));
  }

  #[test]
  fn amount_field_follows_sub_type() {
    let pi = draft(json!({
      "type": "payment_intent.succeeded",
      "data": {"object": {"amount": 1200, "amount_total": 9}}
    }));
    assert_eq!(pi.total_cents, Numeric::Int(1200));

    let inv = draft(json!({
      "type": "invoice.payment_succeeded",
      "data": {"object": {"total": 3000, "amount": 9}}
    }));
    assert_eq!(inv.total_cents, Numeric::Int(3000));

    let other = draft(json!({
      "type": "charge.succeeded",
      "data": {"object": {"amount": 700}}
    }));
    assert_eq!(other.total_cents, Numeric::Int(700));
  }

  #[test]
  fn top_level_fields_are_a_fallback() {
    let ev = draft(json!({
      "type": "checkout.session.completed",
      "amount_total": 2500,
      "currency": "gbp",
      "customer": "cus_1"
    }));
    assert_eq!(ev.total_cents, Numeric::Int(2500));
    assert_eq!(ev.currency, "GBP");
    assert_eq!(ev.customer_ref.as_deref(), Some("cus_1"));
  }

  #[test]
  fn missing_fields_get_best_effort_defaults() {
    let ev = draft(json!({"object": "event"}));
    assert_eq!(ev.total_cents, Numeric::Int(0));
    assert_eq!(ev.currency, "USD");
    assert_eq!(ev.occurred_at, Some(arrival()));
    assert_eq!(ev.provider_event_id.len(), 32);
  }

  #[test]
  fn fractional_amount_stays_invalid() {
    let ev = draft(json!({
      "type": "checkout.session.completed",
      "data": {"object": {"amount_total": 49.5}}
    }));
    assert_eq!(ev.total_cents, Numeric::Invalid);
  }
}
