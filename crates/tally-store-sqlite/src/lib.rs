//! SQLite backend for Tally.
//!
//! Implements the node registry, product catalog and event store traits from
//! [`tally_core::store`]. Wraps [`tokio_rusqlite`] so all database access
//! runs on a dedicated thread without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
