//! Shopify-like order payloads. Prices are major-unit decimal strings.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tally_core::event::{EventType, NormalizedEvent, NormalizedItem, Numeric, Provider};

use crate::{
  coerce::{self, Stamp, field, path_in},
  random_event_id,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ShopifyOrder {
  pub id:             Option<String>,
  pub created_at:     Stamp,
  pub currency:       String,
  pub total_cents:    Numeric,
  pub subtotal_cents: Numeric,
  pub discount_cents: Numeric,
  pub tax_cents:      Numeric,
  pub line_items:     Vec<ShopifyLine>,
  pub customer_ref:   Option<String>,
  pub notes:          Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopifyLine {
  pub name:        Option<String>,
  pub quantity:    Numeric,
  pub price_cents: Numeric,
}

impl ShopifyLine {
  fn from_value(value: &Value) -> Self {
    let Some(obj) = value.as_object() else {
      return Self { name: None, quantity: Numeric::Int(1), price_cents: Numeric::Invalid };
    };
    // A line without a price is free; a price that does not parse is kept
    // invalid for the validator.
    // Absent or garbage quantities count as one unit.
    let quantity = match coerce::integer(field(obj, "quantity")) {
      Numeric::Int(q) => Numeric::Int(q),
      Numeric::Missing | Numeric::Invalid => Numeric::Int(1),
    };
    Self {
      name: coerce::string(field(obj, "title")).or_else(|| coerce::string(field(obj, "name"))),
      quantity,
      price_cents: coerce::major_units_to_cents(field(obj, "price")).or(0),
    }
  }
}

impl ShopifyOrder {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    let subtotal_cents = coerce::major_units_to_cents(field(obj, "subtotal_price"));
    let total_cents = match coerce::major_units_to_cents(field(obj, "total_price")) {
      Numeric::Missing => subtotal_cents,
      total => total,
    };

    let line_items = field(obj, "line_items")
      .and_then(Value::as_array)
      .map(|lines| lines.iter().map(ShopifyLine::from_value).collect())
      .unwrap_or_default();

    Self {
      id: coerce::string(field(obj, "id")),
      created_at: coerce::timestamp(field(obj, "created_at"))
        .or(coerce::timestamp(field(obj, "processed_at"))),
      currency: coerce::currency(field(obj, "currency")),
      total_cents,
      subtotal_cents,
      discount_cents: coerce::major_units_to_cents(field(obj, "total_discounts")),
      tax_cents: coerce::major_units_to_cents(field(obj, "total_tax")),
      line_items,
      customer_ref: coerce::string(path_in(obj, &["customer", "id"]))
        .or_else(|| coerce::string(field(obj, "email"))),
      notes: note_attributes(field(obj, "note_attributes")),
    }
  }

  pub fn into_draft(self, arrival: DateTime<Utc>) -> NormalizedEvent {
    let currency = self.currency;
    let items = self
      .line_items
      .into_iter()
      .map(|line| NormalizedItem {
        name:              line.name,
        quantity:          line.quantity,
        unit_amount_cents: line.price_cents,
        currency:          currency.clone(),
        is_bump:           false,
      })
      .collect();

    NormalizedEvent {
      provider:          Provider::Shopify,
      provider_event_id: self.id.unwrap_or_else(random_event_id),
      event_type:        EventType::Purchase,
      occurred_at:       self.created_at.resolve(arrival),
      currency,
      subtotal_cents:    self.subtotal_cents,
      discount_cents:    self.discount_cents,
      tax_cents:         self.tax_cents,
      total_cents:       self.total_cents.or(0),
      items,
      customer_ref:      self.customer_ref,
      session_ref:       coerce::string(field(&self.notes, "session_id")),
      visitor_ref:       coerce::string(field(&self.notes, "visitor_id")),
      extra:             Map::new(),
    }
  }
}

/// `note_attributes` is a list of `{name, value}` pairs; flatten it.
fn note_attributes(value: Option<&Value>) -> Map<String, Value> {
  let Some(entries) = value.and_then(Value::as_array) else {
    return Map::new();
  };
  entries
    .iter()
    .filter_map(Value::as_object)
    .filter_map(|entry| {
      let name = coerce::string(field(entry, "name"))?;
      let value = field(entry, "value")?.clone();
      Some((name, value))
    })
    .collect()
}
