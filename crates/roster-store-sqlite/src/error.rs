//! Error type for `roster-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[source] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A mutation referenced a root that does not exist.
  #[error("record not found: {0}")]
  RecordNotFound(String),
}

/// Errors raised inside a connection call travel back boxed in
/// [`tokio_rusqlite::Error::Other`]; unwrap them back into this type.
impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<Error>() {
        Ok(inner) => *inner,
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl Error {
  /// Box this error for return from inside a connection call.
  pub(crate) fn into_call_error(self) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(self))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
