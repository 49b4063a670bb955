//! The idempotent event sink.
//!
//! Persists exactly one logical event per [`DedupKey`] even under concurrent
//! duplicate submissions, then attaches the attributed items:
//!
//! 1. upsert the event; on conflict fall back to a read by unique key;
//! 2. insert items against the resolved event id and canonical timestamp.
//!
//! Step 1 is idempotent by key and step 2 by `(event_id, ordinal)`, so a
//! caller may safely retry the whole operation after any failure.

use crate::{
  Error, Result,
  event::{CanonicalEvent, DedupKey, LineItem, StoredEvent},
  store::EventStore,
};

/// What [`persist`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persisted {
  pub event:         StoredEvent,
  /// `true` when the event row already existed.
  pub duplicate:     bool,
  /// Item rows newly written by this call.
  pub items_written: usize,
}

pub async fn persist<S>(
  store: &S,
  workspace_id: &str,
  node_id: &str,
  event: &CanonicalEvent,
  items: &[LineItem],
) -> Result<Persisted>
where
  S: EventStore,
{
  let inserted = store
    .upsert_event(workspace_id, node_id, event)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;

  let (stored, duplicate) = match inserted {
    Some(stored) => (stored, false),
    None => {
      let key = DedupKey::for_event(workspace_id, event);
      let existing = store
        .find_event(&key)
        .await
        .map_err(|e| Error::Store(Box::new(e)))?
        .ok_or_else(|| Error::MissingAfterConflict {
          provider:          event.provider.to_string(),
          provider_event_id: event.provider_event_id.clone(),
        })?;
      (existing, true)
    }
  };

  let items_written = if items.is_empty() {
    0
  } else {
    store
      .insert_items(stored, items)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?
  };

  Ok(Persisted { event: stored, duplicate, items_written })
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
  };

  use chrono::{DateTime, TimeZone, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::event::{EventType, Provider};

  #[derive(Debug, thiserror::Error)]
  #[error("fake store failure")]
  struct FakeError;

  /// An in-memory store whose upsert can be told to behave as if a concurrent
  /// writer won the race.
  #[derive(Default, Clone)]
  struct FakeStore {
    inner: Arc<Mutex<FakeState>>,
  }

  #[derive(Default)]
  struct FakeState {
    events:        HashMap<DedupKey, StoredEvent>,
    items:         HashMap<(Uuid, usize), LineItem>,
    fail_items:    bool,
    lose_conflict: bool,
  }

  impl EventStore for FakeStore {
    type Error = FakeError;

    async fn upsert_event(
      &self,
      workspace_id: &str,
      _node_id: &str,
      event: &CanonicalEvent,
    ) -> Result<Option<StoredEvent>, FakeError> {
      let mut state = self.inner.lock().unwrap();
      let key = DedupKey::for_event(workspace_id, event);
      if state.lose_conflict {
        return Ok(None);
      }
      if state.events.contains_key(&key) {
        return Ok(None);
      }
      let stored = StoredEvent {
        event_id:    Uuid::new_v4(),
        occurred_at: event.occurred_at,
      };
      state.events.insert(key, stored);
      Ok(Some(stored))
    }

    async fn find_event(&self, key: &DedupKey) -> Result<Option<StoredEvent>, FakeError> {
      Ok(self.inner.lock().unwrap().events.get(key).copied())
    }

    async fn insert_items(
      &self,
      event: StoredEvent,
      items: &[LineItem],
    ) -> Result<usize, FakeError> {
      let mut state = self.inner.lock().unwrap();
      if state.fail_items {
        return Err(FakeError);
      }
      let mut written = 0;
      for (ordinal, item) in items.iter().enumerate() {
        if let std::collections::hash_map::Entry::Vacant(slot) =
          state.items.entry((event.event_id, ordinal))
        {
          slot.insert(item.clone());
          written += 1;
        }
      }
      Ok(written)
    }
  }

  fn at() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap() }

  fn event(id: &str) -> CanonicalEvent {
    CanonicalEvent {
      provider:          Provider::Custom,
      provider_event_id: id.into(),
      event_type:        EventType::Purchase,
      occurred_at:       at(),
      currency:          "USD".into(),
      subtotal_cents:    0,
      discount_cents:    0,
      tax_cents:         0,
      total_cents:       9900,
      items:             vec![],
      customer_ref:      None,
      session_ref:       None,
      visitor_ref:       None,
      extra:             serde_json::Map::new(),
    }
  }

  fn item() -> LineItem {
    LineItem {
      name:              Some("Pro".into()),
      quantity:          1,
      unit_amount_cents: 9900,
      currency:          "USD".into(),
      is_bump:           false,
      product_ref:       None,
    }
  }

  #[tokio::test]
  async fn first_submission_inserts() {
    let store = FakeStore::default();
    let out = persist(&store, "ws", "node", &event("order_1"), &[item()])
      .await
      .unwrap();
    assert!(!out.duplicate);
    assert_eq!(out.items_written, 1);
    assert_eq!(out.event.occurred_at, at());
  }

  #[tokio::test]
  async fn duplicate_resolves_existing_row_and_writes_no_items() {
    let store = FakeStore::default();
    let first = persist(&store, "ws", "node", &event("order_1"), &[item()])
      .await
      .unwrap();
    let second = persist(&store, "ws", "node", &event("order_1"), &[item()])
      .await
      .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.event.event_id, first.event.event_id);
    assert_eq!(second.items_written, 0);
    let state = store.inner.lock().unwrap();
    assert_eq!(state.events.len(), 1);
    assert_eq!(state.items.len(), 1);
  }

  #[tokio::test]
  async fn same_id_in_other_workspace_is_distinct() {
    let store = FakeStore::default();
    persist(&store, "ws_a", "node", &event("order_1"), &[]).await.unwrap();
    let out = persist(&store, "ws_b", "node", &event("order_1"), &[])
      .await
      .unwrap();
    assert!(!out.duplicate);
  }

  #[tokio::test]
  async fn retry_after_item_failure_completes_items_once() {
    let store = FakeStore::default();
    store.inner.lock().unwrap().fail_items = true;
    let err = persist(&store, "ws", "node", &event("order_1"), &[item(), item()])
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    store.inner.lock().unwrap().fail_items = false;
    let out = persist(&store, "ws", "node", &event("order_1"), &[item(), item()])
      .await
      .unwrap();
    assert!(out.duplicate);
    assert_eq!(out.items_written, 2);

    let again = persist(&store, "ws", "node", &event("order_1"), &[item(), item()])
      .await
      .unwrap();
    assert_eq!(again.items_written, 0);
    assert_eq!(store.inner.lock().unwrap().items.len(), 2);
  }

  #[tokio::test]
  async fn conflict_without_readable_row_is_an_error() {
    let store = FakeStore::default();
    store.inner.lock().unwrap().lose_conflict = true;
    let err = persist(&store, "ws", "node", &event("order_9"), &[])
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      Error::MissingAfterConflict { ref provider_event_id, .. } if provider_event_id == "order_9"
    ));
  }
}
