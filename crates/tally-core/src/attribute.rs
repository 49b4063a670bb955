//! Price-tolerant attribution of line items to catalog products.
//!
//! Each item is matched independently:
//!
//! 1. the first mapping (in catalog order) with a price point within tolerance
//!    of the item's unit amount wins;
//! 2. otherwise the node's primary product, if one exists;
//! 3. otherwise the item stays unattributed.
//!
//! When the event carried no items at all and a primary product exists, a
//! single item for the event total is synthesised and attributed to it.

use crate::{
  catalog::{ProductMapping, primary},
  event::{CanonicalEvent, LineItem},
};

/// Relative tolerance, in percent of the price point.
const TOLERANCE_PERCENT: i128 = 5;
/// Absolute tolerance floor, in cents.
const TOLERANCE_FLOOR: i128 = 1;

/// Whether `amount` is within tolerance of `point`:
/// `|point − amount| ≤ max(1, point × 5%)`. A non-positive point only gets
/// the one-cent floor.
pub fn price_matches(point: i64, amount: i64) -> bool {
  let point = i128::from(point);
  let amount = i128::from(amount);
  // Integer floor of 5% is exact here: the difference is itself an integer.
  let tolerance = (point.max(0) * TOLERANCE_PERCENT / 100).max(TOLERANCE_FLOOR);
  (point - amount).abs() <= tolerance
}

/// The first mapping with a price point matching `amount`.
pub fn match_price(amount: i64, mappings: &[ProductMapping]) -> Option<&ProductMapping> {
  mappings.iter().find(|m| {
    m.price_points_cents
      .iter()
      .any(|&point| price_matches(point, amount))
  })
}

/// Attribute the event's items against a catalog snapshot.
///
/// Returns the items to persist, in the event's order, each annotated with a
/// `product_ref` where one could be resolved.
pub fn attribute(event: &CanonicalEvent, mappings: &[ProductMapping]) -> Vec<LineItem> {
  let fallback = primary(mappings);

  if event.items.is_empty() {
    return match fallback {
      Some(product) => vec![LineItem {
        name:              product.name.clone(),
        quantity:          1,
        unit_amount_cents: event.total_cents,
        currency:          event.currency.clone(),
        is_bump:           false,
        product_ref:       Some(product.product_id.clone()),
      }],
      None => Vec::new(),
    };
  }

  event
    .items
    .iter()
    .map(|item| {
      let product = match_price(item.unit_amount_cents, mappings).or(fallback);
      LineItem {
        product_ref: product.map(|p| p.product_id.clone()),
        ..item.clone()
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::event::{EventType, Provider};

  fn event(total: i64, amounts: &[i64]) -> CanonicalEvent {
    CanonicalEvent {
      provider:          Provider::Custom,
      provider_event_id: "evt".into(),
      event_type:        EventType::Purchase,
      occurred_at:       Utc::now(),
      currency:          "EUR".into(),
      subtotal_cents:    0,
      discount_cents:    0,
      tax_cents:         0,
      total_cents:       total,
      items:             amounts
        .iter()
        .map(|&a| LineItem {
          name:              None,
          quantity:          1,
          unit_amount_cents: a,
          currency:          "EUR".into(),
          is_bump:           false,
          product_ref:       None,
        })
        .collect(),
      customer_ref:      None,
      session_ref:       None,
      visitor_ref:       None,
      extra:             serde_json::Map::new(),
    }
  }

  #[test]
  fn five_percent_tolerance() {
    assert!(price_matches(1000, 1049));
    assert!(price_matches(1000, 1050));
    assert!(!price_matches(1000, 1051));
    assert!(price_matches(1000, 951));
    assert!(price_matches(1000, 950));
    assert!(!price_matches(1000, 949));
  }

  #[test]
  fn one_cent_floor_for_small_prices() {
    assert!(price_matches(10, 11));
    assert!(price_matches(10, 9));
    assert!(!price_matches(10, 12));
    assert!(price_matches(0, 1));
  }

  #[test]
  fn negative_points_get_only_the_floor() {
    assert!(!price_matches(-1000, -1040));
    assert!(price_matches(-1000, -1001));
    assert!(price_matches(-1000, -999));
    assert!(!price_matches(-1000, -998));
  }

  #[test]
  fn extreme_values_do_not_overflow() {
    assert!(!price_matches(i64::MAX, i64::MIN));
    assert!(price_matches(i64::MIN, i64::MIN));
  }

  #[test]
  fn within_tolerance_matches_and_beyond_falls_back_to_primary() {
    let mappings = vec![
      ProductMapping::new("pro", vec![1000]),
      ProductMapping::new("main", vec![50_000]).primary(),
    ];
    let items = attribute(&event(2100, &[1049, 1051]), &mappings);
    assert_eq!(items[0].product_ref.as_deref(), Some("pro"));
    assert_eq!(items[1].product_ref.as_deref(), Some("main"));
  }

  #[test]
  fn beyond_tolerance_without_primary_stays_unmatched() {
    let mappings = vec![ProductMapping::new("pro", vec![1000])];
    let items = attribute(&event(1051, &[1051]), &mappings);
    assert_eq!(items.len(), 1);
    assert!(items[0].product_ref.is_none());
  }

  #[test]
  fn first_matching_mapping_wins() {
    let mappings = vec![
      ProductMapping::new("a", vec![500, 1000]),
      ProductMapping::new("b", vec![1000]),
    ];
    let items = attribute(&event(1000, &[1000]), &mappings);
    assert_eq!(items[0].product_ref.as_deref(), Some("a"));
  }

  #[test]
  fn no_items_with_primary_synthesises_one() {
    let mut main = ProductMapping::new("main", vec![]).primary();
    main.name = Some("Main offer".into());
    let mappings = vec![ProductMapping::new("other", vec![4900]), main];
    let items = attribute(&event(4900, &[]), &mappings);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 1);
    assert_eq!(items[0].unit_amount_cents, 4900);
    assert_eq!(items[0].currency, "EUR");
    assert_eq!(items[0].name.as_deref(), Some("Main offer"));
    assert_eq!(items[0].product_ref.as_deref(), Some("main"));
  }

  #[test]
  fn no_items_without_primary_yields_nothing() {
    let mappings = vec![ProductMapping::new("other", vec![4900])];
    assert!(attribute(&event(4900, &[]), &mappings).is_empty());
    assert!(attribute(&event(4900, &[]), &[]).is_empty());
  }

  #[test]
  fn items_that_match_nothing_are_not_replaced_by_synthesis() {
    let mappings = vec![ProductMapping::new("pro", vec![1000])];
    let items = attribute(&event(7, &[7]), &mappings);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_amount_cents, 7);
    assert!(items[0].product_ref.is_none());
  }
}
