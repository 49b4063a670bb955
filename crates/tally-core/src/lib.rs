//! Core types and trait definitions for the Tally ingestion pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the canonical event model, validation, attribution, the idempotent sink
//! protocol, and the rate-limiting capability. Storage backends and the HTTP
//! surface depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attribute;
pub mod catalog;
pub mod error;
pub mod event;
pub mod node;
pub mod ratelimit;
pub mod sink;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
