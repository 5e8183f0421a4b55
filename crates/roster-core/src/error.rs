//! Error types for `roster-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("record not found: {0}")]
  RecordNotFound(String),

  /// A required field is missing or blank, or a payload is malformed.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The caller asked to sort by a field the record does not expose.
  #[error("unknown sort field: {0:?}")]
  UnknownSortField(String),

  /// A synthetic fault raised by a [`FaultInjector`](crate::retry::FaultInjector).
  #[error("simulated transient failure")]
  SimulatedFailure,

  #[error("operation failed after {attempts} attempts: {source}")]
  RetriesExhausted {
    attempts: u32,
    #[source]
    source:   Box<Error>,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Whether the failure is the caller's fault rather than the server's.
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      Self::RecordNotFound(_) | Self::Validation(_) | Self::UnknownSortField(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
