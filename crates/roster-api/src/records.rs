//! Handlers for single-record endpoints.
//!
//! | Method   | Path               | Notes |
//! |----------|--------------------|-------|
//! | `POST`   | `/api/entity`      | 201 with `Location`; create is retried |
//! | `GET`    | `/api/entity/{id}` | 404 if not found |
//! | `PUT`    | `/api/entity/{id}` | Merge children by id; 404 if not found |
//! | `DELETE` | `/api/entity/{id}` | 204; children are removed too |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{StatusCode, header},
  response::IntoResponse,
};
use roster_core::{
  record::{Record, RecordPatch},
  service::RecordService,
  store::RecordStore,
};

use crate::error::ApiError;

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /api/entity` — body: a full record.
pub async fn create<S>(
  State(service): State<Arc<RecordService<S>>>,
  Json(record): Json<Record>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore + 'static,
{
  let record = service.create(record).await?;
  let location = format!("/api/entity/{}", record.id);
  Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(record)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /api/entity/{id}`
pub async fn get_one<S>(
  State(service): State<Arc<RecordService<S>>>,
  Path(id): Path<String>,
) -> Result<Json<Record>, ApiError>
where
  S: RecordStore + 'static,
{
  Ok(Json(service.get(&id).await?))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /api/entity/{id}` — body: scalars plus the children to replace.
pub async fn update<S>(
  State(service): State<Arc<RecordService<S>>>,
  Path(id): Path<String>,
  Json(patch): Json<RecordPatch>,
) -> Result<Json<Record>, ApiError>
where
  S: RecordStore + 'static,
{
  Ok(Json(service.update(&id, patch).await?))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /api/entity/{id}`
pub async fn delete_one<S>(
  State(service): State<Arc<RecordService<S>>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore + 'static,
{
  service.delete(&id).await?;
  Ok(StatusCode::NO_CONTENT)
}
