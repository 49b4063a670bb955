//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The upsert reported a conflict but the read-by-key found nothing. Only
  /// possible if the conflicting row vanished between the two calls.
  #[error(
    "event {provider}/{provider_event_id} conflicted on insert but could not \
     be read back"
  )]
  MissingAfterConflict {
    provider:          String,
    provider_event_id: String,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
