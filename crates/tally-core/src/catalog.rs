//! Product catalog snapshot types.
//!
//! Mappings are owned and mutated outside the ingestion pipeline. The pipeline
//! reads one snapshot per request and treats it as immutable.

use serde::{Deserialize, Serialize};

/// A catalog product attached to a node, with the unit prices it is expected
/// to sell at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMapping {
  pub product_id:         String,
  pub name:               Option<String>,
  /// Expected unit prices in minor currency units.
  #[serde(default)]
  pub price_points_cents: Vec<i64>,
  /// The node's conventional default product, used as a fallback target.
  #[serde(default)]
  pub is_primary:         bool,
}

impl ProductMapping {
  pub fn new(product_id: impl Into<String>, price_points_cents: Vec<i64>) -> Self {
    Self {
      product_id: product_id.into(),
      name: None,
      price_points_cents,
      is_primary: false,
    }
  }

  pub fn primary(mut self) -> Self {
    self.is_primary = true;
    self
  }
}

/// The first mapping flagged primary, in catalog order.
pub fn primary(mappings: &[ProductMapping]) -> Option<&ProductMapping> {
  mappings.iter().find(|m| m.is_primary)
}
