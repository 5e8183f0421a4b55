//! Compiles a [`RecordQuery`] into SQL over the `records` table.
//!
//! Each filter stage becomes one conjunct. Stages that inspect a child
//! collection use `EXISTS`, so a record matches when any one child does, and
//! `NULL` columns never satisfy a comparison. Search calls the `fold_case`
//! SQL function that [`SqliteStore`](crate::SqliteStore) registers on open.

use roster_core::query::{RecordQuery, SortField, SortOrder, fold_case};
use rusqlite::types::Value;

use crate::encode::encode_date_bound;

/// The filter, sort and page parts of a listing, ready to be spliced into
/// `SELECT ... FROM records r`.
#[derive(Debug, Default)]
pub struct CompiledQuery {
  /// Either empty or a full `WHERE ...` clause.
  pub where_clause: String,
  pub params:       Vec<Value>,
  pub order_by:     String,
  pub limit:        i64,
  pub offset:       i64,
}

impl CompiledQuery {
  pub fn count_sql(&self) -> String {
    format!("SELECT COUNT(*) FROM records r {}", self.where_clause)
  }

  pub fn page_sql(&self) -> String {
    format!(
      "SELECT r.id, r.gender, r.deceased FROM records r {} ORDER BY {} LIMIT ? OFFSET ?",
      self.where_clause, self.order_by
    )
  }

  /// Filter parameters followed by `LIMIT` and `OFFSET`.
  pub fn page_params(&self) -> Vec<Value> {
    let mut params = self.params.clone();
    params.push(Value::Integer(self.limit));
    params.push(Value::Integer(self.offset));
    params
  }
}

pub fn compile(query: &RecordQuery) -> CompiledQuery {
  let filters = &query.filters;
  let mut conjuncts: Vec<String> = Vec::new();
  let mut params: Vec<Value> = Vec::new();

  if let Some(term) = filters.search_term() {
    let needle = fold_case(term);
    conjuncts.push(
      "(EXISTS (SELECT 1 FROM addresses a WHERE a.record_id = r.id \
         AND instr(fold_case(a.address_line), ?) > 0) \
       OR EXISTS (SELECT 1 FROM names n WHERE n.record_id = r.id \
         AND (instr(fold_case(n.first_name), ?) > 0 \
           OR instr(fold_case(n.last_name), ?) > 0)))"
        .to_owned(),
    );
    params.extend(std::iter::repeat_n(Value::Text(needle), 3));
  }

  if let Some(gender) = filters.gender.value() {
    conjuncts.push("r.gender = ?".to_owned());
    params.push(Value::Text(gender.to_owned()));
  }

  for (bound, op) in [(filters.start_date, ">="), (filters.end_date, "<=")] {
    if let Some(date) = bound {
      conjuncts.push(format!(
        "EXISTS (SELECT 1 FROM dates d WHERE d.record_id = r.id \
           AND d.date_value IS NOT NULL AND substr(d.date_value, 1, 10) {op} ?)"
      ));
      params.push(Value::Text(encode_date_bound(date)));
    }
  }

  if !filters.countries.is_empty() {
    let placeholders = vec!["?"; filters.countries.len()].join(", ");
    conjuncts.push(format!(
      "EXISTS (SELECT 1 FROM addresses a WHERE a.record_id = r.id \
         AND a.country IN ({placeholders}))"
    ));
    params.extend(filters.countries.iter().cloned().map(Value::Text));
  }

  let where_clause = if conjuncts.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conjuncts.join(" AND "))
  };

  let column = match query.sort.field {
    SortField::Id => "r.id",
    SortField::Gender => "r.gender",
    SortField::Deceased => "r.deceased",
  };
  let direction = match query.sort.order {
    SortOrder::Asc => "ASC",
    SortOrder::Desc => "DESC",
  };
  let order_by = if query.sort.field == SortField::Id {
    format!("r.id {direction}")
  } else {
    format!("{column} {direction}, r.id ASC")
  };

  CompiledQuery {
    where_clause,
    params,
    order_by,
    limit: i64::from(query.page.page_size),
    offset: i64::try_from(query.page.offset()).unwrap_or(i64::MAX),
  }
}
