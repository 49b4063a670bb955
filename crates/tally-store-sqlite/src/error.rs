//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored discriminant that no longer maps to a known variant.
  #[error("unknown {kind} in database: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("node {0} already exists")]
  NodeExists(String),

  /// Quantities are stored as SQLite integers; this only fires on rows that
  /// were written outside the store.
  #[error("item quantity out of range: {0}")]
  QuantityRange(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
