//! Collaborator traits implemented by storage backends.
//!
//! The pipeline talks to three collaborators: a node registry (identity and
//! token lookup), a product catalog (mapping snapshots), and an event store
//! (the only state-mutating calls). Backends such as `tally-store-sqlite`
//! usually implement all three; [`IngestStore`] names that combination.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use crate::{
  catalog::ProductMapping,
  event::{CanonicalEvent, DedupKey, LineItem, StoredEvent},
  node::NodeRecord,
};

// ─── Registry ────────────────────────────────────────────────────────────────

pub trait NodeRegistry: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look up a node by id. Returns `None` if no such node exists.
  fn get_node<'a>(
    &'a self,
    node_id: &'a str,
  ) -> impl Future<Output = Result<Option<NodeRecord>, Self::Error>> + Send + 'a;
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

pub trait ProductCatalog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The node's current product mappings in catalog order (possibly empty).
  fn product_mappings<'a>(
    &'a self,
    workspace_id: &'a str,
    node_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ProductMapping>, Self::Error>> + Send + 'a;
}

// ─── Events ──────────────────────────────────────────────────────────────────

pub trait EventStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Atomically insert the event unless a row with the same [`DedupKey`]
  /// exists.
  ///
  /// Returns the stored row on insert, or `None` when the key already existed
  /// (including when a concurrent writer won the race).
  fn upsert_event<'a>(
    &'a self,
    workspace_id: &'a str,
    node_id: &'a str,
    event: &'a CanonicalEvent,
  ) -> impl Future<Output = Result<Option<StoredEvent>, Self::Error>> + Send + 'a;

  /// Read an existing event row by its unique key.
  fn find_event<'a>(
    &'a self,
    key: &'a DedupKey,
  ) -> impl Future<Output = Result<Option<StoredEvent>, Self::Error>> + Send + 'a;

  /// Insert items for a stored event in one batch.
  ///
  /// Items are keyed by `(event_id, ordinal)` where the ordinal is the item's
  /// index in `items`; rows that already exist are left untouched. Returns the
  /// number of rows newly written.
  fn insert_items<'a>(
    &'a self,
    event: StoredEvent,
    items: &'a [LineItem],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}

// ─── Combination ─────────────────────────────────────────────────────────────

/// A backend that provides every collaborator the ingestion pipeline needs.
pub trait IngestStore: NodeRegistry + ProductCatalog + EventStore {}

impl<T> IngestStore for T where T: NodeRegistry + ProductCatalog + EventStore {}
