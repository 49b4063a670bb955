//! Error types for the tally-normalize codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The payload matched none of the known provider shapes.
  #[error("unsupported payload: no known provider shape matched")]
  Unsupported,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
