//! Handler for `GET /api/entity/entities`.
//!
//! Query keys are matched case-insensitively, so `pageSize`, `pagesize` and
//! `PageSize` are the same parameter. `countries` is repeated once per
//! country; each value is taken verbatim. Empty values count as absent.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use roster_core::{
  query::{GenderFilter, ListRequest, Page},
  record::{Record, parse_date_value},
  service::RecordService,
  store::RecordStore,
};

use crate::error::ApiError;

/// `GET /api/entity/entities[?search=..][&gender=..][&startDate=..][&endDate=..]
/// [&countries=..][&page=..][&pageSize=..][&sortBy=..][&sortOrder=..]`
pub async fn handler<S>(
  State(service): State<Arc<RecordService<S>>>,
  Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Page<Record>>, ApiError>
where
  S: RecordStore + 'static,
{
  let request = parse_list_request(pairs)?;
  let page = service.list(request).await?;
  Ok(Json(page))
}

/// Fold raw query pairs into a [`ListRequest`]. Unknown keys are ignored.
pub fn parse_list_request(
  pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<ListRequest, ApiError> {
  let mut request = ListRequest::default();

  for (key, value) in pairs {
    let value = value.trim();
    if value.is_empty() {
      continue;
    }
    match key.to_ascii_lowercase().as_str() {
      "search" => request.filters.search = Some(value.to_owned()),
      "gender" => {
        request.filters.gender = value
          .parse::<GenderFilter>()
          .map_err(|e| ApiError::BadRequest(e.to_string()))?;
      }
      "startdate" => request.filters.start_date = Some(parse_date("startDate", value)?),
      "enddate" => request.filters.end_date = Some(parse_date("endDate", value)?),
      "countries" => request.filters.countries.push(value.to_owned()),
      "page" => request.page = parse_int("page", value)?,
      "pagesize" => request.page_size = parse_int("pageSize", value)?,
      "sortby" => request.sort_by = Some(value.to_owned()),
      "sortorder" => request.sort_order = Some(value.to_owned()),
      _ => {}
    }
  }

  Ok(request)
}

/// Accepts a bare date or a date-time; only the date part is kept.
fn parse_date(name: &str, value: &str) -> Result<NaiveDate, ApiError> {
  parse_date_value(value)
    .map(|dt| dt.date())
    .map_err(|e| ApiError::BadRequest(format!("invalid {name} {value:?}: {e}")))
}

fn parse_int(name: &str, value: &str) -> Result<i64, ApiError> {
  value
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("invalid {name} {value:?}: expected an integer")))
}
