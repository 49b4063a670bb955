//! Signature-free provider shape detection.
//!
//! Predicates run in a fixed priority order and the first match wins; shapes
//! share field names, so the order is part of the contract. False positives
//! are possible and accepted: detection needs no provider secret.

use serde_json::{Map, Value};
use tally_core::event::Provider;

use crate::coerce::{has, path_in};

/// The classification of a raw payload. [`Shape::Unsupported`] is a terminal
/// outcome, not an absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
  Stripe,
  Paddle,
  Lemon,
  Shopify,
  Custom,
  Unsupported,
}

impl Shape {
  pub fn provider(&self) -> Option<Provider> {
    match self {
      Self::Stripe => Some(Provider::Stripe),
      Self::Paddle => Some(Provider::Paddle),
      Self::Lemon => Some(Provider::Lemon),
      Self::Shopify => Some(Provider::Shopify),
      Self::Custom => Some(Provider::Custom),
      Self::Unsupported => None,
    }
  }
}

/// Shapes in priority order with their predicates.
const PRIORITY: [(Shape, fn(&Map<String, Value>) -> bool); 5] = [
  (Shape::Stripe, is_stripe_like),
  (Shape::Paddle, is_paddle_like),
  (Shape::Lemon, is_lemon_like),
  (Shape::Shopify, is_shopify_like),
  (Shape::Custom, is_custom_like),
];

/// Classify any JSON value. Non-objects are always unsupported.
pub fn detect(value: &Value) -> Shape {
  let Some(obj) = value.as_object() else {
    return Shape::Unsupported;
  };
  PRIORITY
    .iter()
    .find(|(_, predicate)| predicate(obj))
    .map_or(Shape::Unsupported, |(shape, _)| *shape)
}

/// `object == "event"`, or a `type` with a dot-separated namespace such as
/// `checkout.session.completed`.
pub fn is_stripe_like(obj: &Map<String, Value>) -> bool {
  if obj.get("object").and_then(Value::as_str) == Some("event") {
    return true;
  }
  obj
    .get("type")
    .and_then(Value::as_str)
    .is_some_and(is_namespaced)
}

fn is_namespaced(s: &str) -> bool {
  let mut segments = s.split('.');
  let first_ok = segments.next().is_some_and(|seg| !seg.is_empty());
  let rest: Vec<&str> = segments.collect();
  first_ok && !rest.is_empty() && rest.iter().all(|seg| !seg.is_empty())
}

/// Any of `alert_id`, `event_time`, `order_id`.
pub fn is_paddle_like(obj: &Map<String, Value>) -> bool {
  ["alert_id", "event_time", "order_id"]
    .iter()
    .any(|key| has(obj, key))
}

/// `meta.event_name` or `data.attributes.total`.
pub fn is_lemon_like(obj: &Map<String, Value>) -> bool {
  path_in(obj, &["meta", "event_name"]).is_some()
    || path_in(obj, &["data", "attributes", "total"]).is_some()
}

/// A `line_items` array together with `total_price` or `subtotal_price`.
pub fn is_shopify_like(obj: &Map<String, Value>) -> bool {
  obj.get("line_items").is_some_and(Value::is_array)
    && (has(obj, "total_price") || has(obj, "subtotal_price"))
}

/// `total_cents` or `items`.
pub fn is_custom_like(obj: &Map<String, Value>) -> bool {
  has(obj, "total_cents") || has(obj, "items")
}
