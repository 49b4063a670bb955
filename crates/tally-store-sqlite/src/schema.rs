//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS nodes (
    node_id       TEXT PRIMARY KEY,
    workspace_id  TEXT NOT NULL,
    token_sha256  TEXT NOT NULL,   -- hex digest; plaintext is never stored
    created_at    TEXT NOT NULL
);

-- Catalog rows are read as an ordered snapshot; `position` is the order.
CREATE TABLE IF NOT EXISTS products (
    node_id       TEXT NOT NULL REFERENCES nodes(node_id),
    product_id    TEXT NOT NULL,
    position      INTEGER NOT NULL,
    name          TEXT,
    price_points  TEXT NOT NULL DEFAULT '[]',   -- JSON array of cents
    is_primary    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (node_id, product_id)
);

-- One row per logical event. The unique key is the deduplication contract.
CREATE TABLE IF NOT EXISTS events (
    event_id           TEXT PRIMARY KEY,
    workspace_id       TEXT NOT NULL,
    node_id            TEXT NOT NULL,
    provider           TEXT NOT NULL,
    provider_event_id  TEXT NOT NULL,
    event_type         TEXT NOT NULL,
    occurred_at        TEXT NOT NULL,   -- RFC 3339 UTC, canonical form
    received_at        TEXT NOT NULL,
    currency           TEXT NOT NULL,
    subtotal_cents     INTEGER NOT NULL,
    discount_cents     INTEGER NOT NULL,
    tax_cents          INTEGER NOT NULL,
    total_cents        INTEGER NOT NULL,
    customer_ref       TEXT,
    session_ref        TEXT,
    visitor_ref        TEXT,
    extra              TEXT NOT NULL DEFAULT '{}',
    UNIQUE (workspace_id, provider, provider_event_id, occurred_at)
);

-- Items are keyed by ordinal so a retried batch never duplicates rows.
CREATE TABLE IF NOT EXISTS event_items (
    event_id           TEXT NOT NULL REFERENCES events(event_id),
    occurred_at        TEXT NOT NULL,
    ordinal            INTEGER NOT NULL,
    name               TEXT,
    quantity           INTEGER NOT NULL,
    unit_amount_cents  INTEGER NOT NULL,
    currency           TEXT NOT NULL,
    is_bump            INTEGER NOT NULL DEFAULT 0,
    product_ref        TEXT,
    PRIMARY KEY (event_id, ordinal)
);

CREATE INDEX IF NOT EXISTS events_workspace_idx ON events(workspace_id, occurred_at);
CREATE INDEX IF NOT EXISTS nodes_workspace_idx  ON nodes(workspace_id);

PRAGMA user_version = 1;
";
