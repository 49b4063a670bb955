//! [`SqliteStore`], the SQLite implementation of the ingestion store traits.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  catalog::ProductMapping,
  event::{CanonicalEvent, DedupKey, LineItem, RecordedEvent, StoredEvent},
  node::{NodeRecord, generate_token, hash_token},
  store::{EventStore, NodeRegistry, ProductCatalog},
};

use crate::{
  Error, Result,
  encode::{
    RawEvent, RawItem, RawProduct, decode_dt, decode_uuid, encode_dt, encode_price_points,
    encode_uuid,
  },
  schema::SCHEMA,
};

const EVENT_COLUMNS: &str = "event_id, workspace_id, node_id, provider, provider_event_id,
  event_type, occurred_at, received_at, currency, subtotal_cents, discount_cents, tax_cents,
  total_cents, customer_ref, session_ref, visitor_ref, extra";

fn raw_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
  Ok(RawEvent {
    event_id:          row.get(0)?,
    workspace_id:      row.get(1)?,
    node_id:           row.get(2)?,
    provider:          row.get(3)?,
    provider_event_id: row.get(4)?,
    event_type:        row.get(5)?,
    occurred_at:       row.get(6)?,
    received_at:       row.get(7)?,
    currency:          row.get(8)?,
    subtotal_cents:    row.get(9)?,
    discount_cents:    row.get(10)?,
    tax_cents:         row.get(11)?,
    total_cents:       row.get(12)?,
    customer_ref:      row.get(13)?,
    session_ref:       row.get(14)?,
    visitor_ref:       row.get(15)?,
    extra:             row.get(16)?,
  })
}

fn stored_event(event_id: &str, occurred_at: &str) -> Result<StoredEvent> {
  Ok(StoredEvent {
    event_id:    decode_uuid(event_id)?,
    occurred_at: decode_dt(occurred_at)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All calls are
/// serialized on the connection's thread, and the `events` unique key holds
/// across processes sharing the file.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Administration ────────────────────────────────────────────────────────

  /// Register a node under a workspace and return its plaintext token. The
  /// token is shown once; only its digest is stored.
  pub async fn register_node(&self, workspace_id: &str, node_id: &str) -> Result<String> {
    let token = generate_token();
    let digest = hash_token(&token);
    let workspace = workspace_id.to_owned();
    let node = node_id.to_owned();
    let at_str = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO nodes (node_id, workspace_id, token_sha256, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(node_id) DO NOTHING",
          rusqlite::params![node, workspace, digest, at_str],
        )?;
        Ok(n)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::NodeExists(node_id.to_owned()));
    }
    tracing::info!(workspace_id, node_id, "registered node");
    Ok(token)
  }

  /// Add a product to the end of a node's catalog, or update it in place if
  /// the product id is already mapped.
  pub async fn add_product(&self, node_id: &str, mapping: &ProductMapping) -> Result<()> {
    let node = node_id.to_owned();
    let product_id = mapping.product_id.clone();
    let name = mapping.name.clone();
    let points = encode_price_points(&mapping.price_points_cents)?;
    let is_primary = mapping.is_primary;

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM nodes WHERE node_id = ?1",
            rusqlite::params![node],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO products (node_id, product_id, position, name, price_points, is_primary)
           VALUES (
             ?1, ?2,
             (SELECT COALESCE(MAX(position) + 1, 0) FROM products WHERE node_id = ?1),
             ?3, ?4, ?5
           )
           ON CONFLICT(node_id, product_id) DO UPDATE SET
             name         = excluded.name,
             price_points = excluded.price_points,
             is_primary   = excluded.is_primary",
          rusqlite::params![node, product_id, name, points, is_primary],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::NodeNotFound(node_id.to_owned()));
    }
    Ok(())
  }

  /// Every event recorded for a workspace with its items, oldest first.
  pub async fn recorded_events(&self, workspace_id: &str) -> Result<Vec<RecordedEvent>> {
    let workspace = workspace_id.to_owned();

    let raws: Vec<(RawEvent, Vec<RawItem>)> = self
      .conn
      .call(move |conn| {
        let mut events = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE workspace_id = ?1
           ORDER BY occurred_at, received_at"
        ))?;
        let mut items = conn.prepare(
          "SELECT name, quantity, unit_amount_cents, currency, is_bump, product_ref
           FROM event_items WHERE event_id = ?1 ORDER BY ordinal",
        )?;

        let rows = events
          .query_map(rusqlite::params![workspace], raw_event)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for raw in rows {
          let item_rows = items
            .query_map(rusqlite::params![raw.event_id], |row| {
              Ok(RawItem {
                name:              row.get(0)?,
                quantity:          row.get(1)?,
                unit_amount_cents: row.get(2)?,
                currency:          row.get(3)?,
                is_bump:           row.get(4)?,
                product_ref:       row.get(5)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.push((raw, item_rows));
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(raw, items)| {
        let items = items.into_iter().map(RawItem::into_item).collect::<Result<_>>()?;
        raw.into_recorded(items)
      })
      .collect()
  }
}

// ─── NodeRegistry impl ───────────────────────────────────────────────────────

impl NodeRegistry for SqliteStore {
  type Error = Error;

  async fn get_node(&self, node_id: &str) -> Result<Option<NodeRecord>> {
    let id = node_id.to_owned();

    let node = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT node_id, workspace_id, token_sha256 FROM nodes WHERE node_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(NodeRecord {
                node_id:      row.get(0)?,
                workspace_id: row.get(1)?,
                token_sha256: row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    Ok(node)
  }
}

// ─── ProductCatalog impl ─────────────────────────────────────────────────────

impl ProductCatalog for SqliteStore {
  type Error = Error;

  async fn product_mappings(
    &self,
    workspace_id: &str,
    node_id: &str,
  ) -> Result<Vec<ProductMapping>> {
    let workspace = workspace_id.to_owned();
    let node = node_id.to_owned();

    let raws: Vec<RawProduct> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT p.product_id, p.name, p.price_points, p.is_primary
           FROM products p
           JOIN nodes n ON n.node_id = p.node_id
           WHERE p.node_id = ?1 AND n.workspace_id = ?2
           ORDER BY p.position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![node, workspace], |row| {
            Ok(RawProduct {
              product_id:   row.get(0)?,
              name:         row.get(1)?,
              price_points: row.get(2)?,
              is_primary:   row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProduct::into_mapping).collect()
  }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

impl EventStore for SqliteStore {
  type Error = Error;

  async fn upsert_event(
    &self,
    workspace_id: &str,
    node_id: &str,
    event: &CanonicalEvent,
  ) -> Result<Option<StoredEvent>> {
    let event_id_str      = encode_uuid(Uuid::new_v4());
    let workspace         = workspace_id.to_owned();
    let node              = node_id.to_owned();
    let provider          = event.provider.as_str();
    let provider_event_id = event.provider_event_id.clone();
    let event_type        = event.event_type.as_str();
    let occurred_at_str   = encode_dt(event.occurred_at);
    let received_at_str   = encode_dt(Utc::now());
    let currency          = event.currency.clone();
    let cents = [event.subtotal_cents, event.discount_cents, event.tax_cents, event.total_cents];
    let refs = [
      event.customer_ref.clone(),
      event.session_ref.clone(),
      event.visitor_ref.clone(),
    ];
    let extra = serde_json::to_string(&event.extra)?;

    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        let [subtotal, discount, tax, total] = cents;
        let [customer_ref, session_ref, visitor_ref] = refs;
        Ok(conn
          .query_row(
            &format!(
              "INSERT INTO events ({EVENT_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
               ON CONFLICT(workspace_id, provider, provider_event_id, occurred_at) DO NOTHING
               RETURNING event_id, occurred_at"
            ),
            rusqlite::params![
              event_id_str,
              workspace,
              node,
              provider,
              provider_event_id,
              event_type,
              occurred_at_str,
              received_at_str,
              currency,
              subtotal,
              discount,
              tax,
              total,
              customer_ref,
              session_ref,
              visitor_ref,
              extra,
            ],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    row.map(|(id, at)| stored_event(&id, &at)).transpose()
  }

  async fn find_event(&self, key: &DedupKey) -> Result<Option<StoredEvent>> {
    let workspace = key.workspace_id.clone();
    let provider = key.provider.as_str();
    let provider_event_id = key.provider_event_id.clone();
    let occurred_at_str = encode_dt(key.occurred_at);

    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT event_id, occurred_at FROM events
             WHERE workspace_id = ?1 AND provider = ?2
               AND provider_event_id = ?3 AND occurred_at = ?4",
            rusqlite::params![workspace, provider, provider_event_id, occurred_at_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    row.map(|(id, at)| stored_event(&id, &at)).transpose()
  }

  async fn insert_items(&self, event: StoredEvent, items: &[LineItem]) -> Result<usize> {
    let event_id_str = encode_uuid(event.event_id);
    let occurred_at_str = encode_dt(event.occurred_at);
    let items = items.to_vec();

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO event_items (
               event_id, occurred_at, ordinal, name, quantity,
               unit_amount_cents, currency, is_bump, product_ref
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(event_id, ordinal) DO NOTHING",
          )?;
          for (ordinal, item) in items.iter().enumerate() {
            written += stmt.execute(rusqlite::params![
              event_id_str,
              occurred_at_str,
              ordinal as i64,
              item.name,
              i64::from(item.quantity),
              item.unit_amount_cents,
              item.currency,
              item.is_bump,
              item.product_ref,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }
}
