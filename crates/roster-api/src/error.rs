//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Anything the caller cannot fix: exhausted retries, store failures.
  #[error("internal error: {0}")]
  Internal(#[source] roster_core::Error),
}

impl From<roster_core::Error> for ApiError {
  fn from(e: roster_core::Error) -> Self {
    use roster_core::Error as E;
    match e {
      E::RecordNotFound(id) => Self::NotFound(format!("record {id} not found")),
      e if e.is_client_error() => Self::BadRequest(e.to_string()),
      e => Self::Internal(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Internal(_) => (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_owned(),
      ),
    };

    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    } else {
      tracing::warn!(%status, error = %self, "request rejected");
    }

    (status, Json(json!({ "error": message }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use roster_core::Error;

  use super::*;

  #[test]
  fn core_errors_map_to_statuses() {
    let cases = [
      (Error::RecordNotFound("x".into()), StatusCode::NOT_FOUND),
      (Error::Validation("Id is required".into()), StatusCode::BAD_REQUEST),
      (Error::UnknownSortField("city".into()), StatusCode::BAD_REQUEST),
      (Error::SimulatedFailure, StatusCode::INTERNAL_SERVER_ERROR),
      (
        Error::RetriesExhausted {
          attempts: 4,
          source:   Box::new(Error::SimulatedFailure),
        },
        StatusCode::INTERNAL_SERVER_ERROR,
      ),
    ];
    for (error, status) in cases {
      assert_eq!(ApiError::from(error).into_response().status(), status);
    }
  }
}
