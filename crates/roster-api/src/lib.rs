//! JSON REST API for Roster.
//!
//! Exposes an axum [`Router`] backed by a [`RecordService`] over any
//! [`RecordStore`]. Transport concerns (binding, tracing layers) are the
//! caller's responsibility.

pub mod error;
pub mod listing;
pub mod records;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use roster_core::{service::RecordService, store::RecordStore};

pub use error::ApiError;

/// Build the `/api/entity` router for `service`.
///
/// The static `/entities` segment wins over the `{id}` capture, so a record
/// whose id is literally `entities` can be created but not fetched by path.
pub fn api_router<S>(service: Arc<RecordService<S>>) -> Router<()>
where
  S: RecordStore + 'static,
{
  Router::new()
    .route("/api/entity", post(records::create::<S>))
    .route("/api/entity/entities", get(listing::handler::<S>))
    .route(
      "/api/entity/{id}",
      get(records::get_one::<S>)
        .put(records::update::<S>)
        .delete(records::delete_one::<S>),
    )
    .with_state(service)
}
