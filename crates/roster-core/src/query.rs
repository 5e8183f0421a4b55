//! Query construction and result shaping for record listings.
//!
//! A listing request is turned into a [`RecordQuery`] by
//! [`RecordQuery::build`], which validates the sort key and page window up
//! front. The query is then evaluated either in memory via
//! [`RecordQuery::apply`] or compiled by a storage backend into its native
//! query language.
//!
//! Filter stages combine by conjunction. Within a stage that inspects a child
//! collection, one matching child is enough, and a child whose inspected field
//! is null never matches.

use std::{cmp::Ordering, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{DateEntry, Record},
};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound applied to `pageSize` unless a service overrides it.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

// ─── Filters ─────────────────────────────────────────────────────────────────

/// The `gender` listing parameter. `All` disables the filter.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum GenderFilter {
  Male,
  Female,
  Other,
  #[default]
  All,
}

impl GenderFilter {
  /// The stored gender value this filter selects, or `None` for `All`.
  pub fn value(self) -> Option<&'static str> {
    match self {
      Self::Male => Some("Male"),
      Self::Female => Some("Female"),
      Self::Other => Some("Other"),
      Self::All => None,
    }
  }
}

impl FromStr for GenderFilter {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    [Self::Male, Self::Female, Self::Other, Self::All]
      .into_iter()
      .find(|g| format!("{g:?}").eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| Error::Validation(format!("unknown gender filter: {s:?}")))
  }
}

/// Predicates applied to a listing, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilters {
  /// Case-insensitive substring matched against address lines and names.
  pub search:     Option<String>,
  pub gender:     GenderFilter,
  /// Inclusive lower bound on the date part of any `DateValue`.
  pub start_date: Option<NaiveDate>,
  /// Inclusive upper bound on the date part of any `DateValue`.
  pub end_date:   Option<NaiveDate>,
  /// Keep records with at least one address in one of these countries.
  pub countries:  Vec<String>,
}

impl RecordFilters {
  /// The search term, if one is present and non-empty.
  pub fn search_term(&self) -> Option<&str> {
    self.search.as_deref().filter(|s| !s.is_empty())
  }

  pub fn matches(&self, record: &Record) -> bool {
    self.matches_search(record)
      && self.matches_gender(record)
      && self.matches_start_date(record)
      && self.matches_end_date(record)
      && self.matches_countries(record)
  }

  fn matches_search(&self, record: &Record) -> bool {
    let Some(term) = self.search_term() else {
      return true;
    };
    let needle = fold_case(term);
    let contains = |field: Option<&str>| {
      field.is_some_and(|f| fold_case(f).contains(&needle))
    };

    record
      .addresses
      .iter()
      .any(|a| contains(a.address_line.as_deref()))
      || record.names.iter().any(|n| {
        contains(Some(&n.first_name)) || contains(Some(&n.last_name))
      })
  }

  fn matches_gender(&self, record: &Record) -> bool {
    match self.gender.value() {
      Some(wanted) => record.gender.as_deref() == Some(wanted),
      None => true,
    }
  }

  fn matches_start_date(&self, record: &Record) -> bool {
    match self.start_date {
      Some(start) => any_date(&record.dates, |d| d >= start),
      None => true,
    }
  }

  fn matches_end_date(&self, record: &Record) -> bool {
    match self.end_date {
      Some(end) => any_date(&record.dates, |d| d <= end),
      None => true,
    }
  }

  fn matches_countries(&self, record: &Record) -> bool {
    if self.countries.is_empty() {
      return true;
    }
    record.addresses.iter().any(|a| {
      a.country
        .as_ref()
        .is_some_and(|c| self.countries.contains(c))
    })
  }
}

/// Case folding used by search. Storage backends must fold stored text
/// with this same function so every backend agrees on what matches.
pub fn fold_case(s: &str) -> String { s.to_lowercase() }

fn any_date(dates: &[DateEntry], pred: impl Fn(NaiveDate) -> bool) -> bool {
  dates
    .iter()
    .filter_map(|d| d.date_value)
    .any(|dt| pred(dt.date()))
}

// ─── Sorting ─────────────────────────────────────────────────────────────────

/// The scalar record fields a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
  #[default]
  Id,
  Gender,
  Deceased,
}

impl SortField {
  pub const ALL: [SortField; 3] = [Self::Id, Self::Gender, Self::Deceased];

  /// The field's wire name.
  pub fn name(self) -> &'static str {
    match self {
      Self::Id => "Id",
      Self::Gender => "Gender",
      Self::Deceased => "Deceased",
    }
  }

  /// Resolve a caller-supplied name. Only the first character is
  /// upper-cased, so `gender` resolves but `GENDER` does not.
  pub fn resolve(name: &str) -> Result<Self> {
    let normalized = capitalize_first(name);
    Self::ALL
      .into_iter()
      .find(|f| f.name() == normalized)
      .ok_or_else(|| Error::UnknownSortField(name.to_owned()))
  }

  fn compare(self, a: &Record, b: &Record) -> Ordering {
    match self {
      Self::Id => a.id.cmp(&b.id),
      Self::Gender => a.gender.cmp(&b.gender),
      Self::Deceased => a.deceased.cmp(&b.deceased),
    }
  }
}

fn capitalize_first(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

impl SortOrder {
  /// `desc` in any case is descending; anything else is ascending.
  pub fn parse(s: &str) -> Self {
    if s.trim().eq_ignore_ascii_case("desc") {
      Self::Desc
    } else {
      Self::Asc
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sort {
  pub field: SortField,
  pub order: SortOrder,
}

impl Sort {
  /// Resolve optional `sortBy` / `sortOrder` parameters. A missing or blank
  /// `sortBy` sorts by `Id`.
  pub fn parse(sort_by: Option<&str>, sort_order: Option<&str>) -> Result<Self> {
    let field = match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
      Some(name) => SortField::resolve(name)?,
      None => SortField::default(),
    };
    let order = sort_order.map(SortOrder::parse).unwrap_or_default();
    Ok(Self { field, order })
  }

  /// Order two records. Ties fall back to ascending `Id`.
  pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
    let primary = self.field.compare(a, b);
    let primary = match self.order {
      SortOrder::Asc => primary,
      SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
  }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// A validated 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub page:      u32,
  pub page_size: u32,
}

impl PageRequest {
  /// Validate `page` and `page_size`, clamping the latter to `max_page_size`.
  pub fn new(page: i64, page_size: i64, max_page_size: u32) -> Result<Self> {
    if page < 1 {
      return Err(Error::Validation(format!("page must be at least 1, got {page}")));
    }
    if page_size < 1 {
      return Err(Error::Validation(format!(
        "pageSize must be at least 1, got {page_size}"
      )));
    }
    let page = u32::try_from(page)
      .map_err(|_| Error::Validation(format!("page {page} is out of range")))?;
    let max = i64::from(max_page_size.max(1));
    let page_size = page_size.min(max) as u32;
    Ok(Self { page, page_size })
  }

  /// Records skipped before this page.
  pub fn offset(&self) -> u64 {
    u64::from(self.page - 1) * u64::from(self.page_size)
  }

  pub fn total_pages(&self, total_count: u64) -> u64 {
    total_count.div_ceil(u64::from(self.page_size))
  }

  /// Cut this page out of an already filtered and sorted sequence.
  pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
    let skip = usize::try_from(self.offset()).unwrap_or(usize::MAX);
    items
      .into_iter()
      .skip(skip)
      .take(self.page_size as usize)
      .collect()
  }
}

impl Default for PageRequest {
  fn default() -> Self {
    Self { page: 1, page_size: DEFAULT_PAGE_SIZE as u32 }
  }
}

/// The listing envelope returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page<T> {
  pub total_count:  u64,
  pub total_pages:  u64,
  pub current_page: u32,
  pub page_size:    u32,
  pub entities:     Vec<T>,
}

impl<T> Page<T> {
  pub fn new(request: PageRequest, total_count: u64, entities: Vec<T>) -> Self {
    Self {
      total_count,
      total_pages: request.total_pages(total_count),
      current_page: request.page,
      page_size: request.page_size,
      entities,
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Unvalidated listing parameters as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
  pub filters:    RecordFilters,
  pub sort_by:    Option<String>,
  pub sort_order: Option<String>,
  pub page:       i64,
  pub page_size:  i64,
}

impl Default for ListRequest {
  fn default() -> Self {
    Self {
      filters:    RecordFilters::default(),
      sort_by:    None,
      sort_order: None,
      page:       1,
      page_size:  DEFAULT_PAGE_SIZE,
    }
  }
}

/// A fully validated listing query: filters, then sort, then page window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
  pub filters: RecordFilters,
  pub sort:    Sort,
  pub page:    PageRequest,
}

impl RecordQuery {
  /// Compose a query from raw parameters. Fails on an unknown sort field or
  /// an invalid page window; never silently falls back.
  pub fn build(request: ListRequest, max_page_size: u32) -> Result<Self> {
    let sort = Sort::parse(request.sort_by.as_deref(), request.sort_order.as_deref())?;
    let page = PageRequest::new(request.page, request.page_size, max_page_size)?;
    Ok(Self { filters: request.filters, sort, page })
  }

  pub fn matches(&self, record: &Record) -> bool { self.filters.matches(record) }

  /// Evaluate the query over a base collection. Returns the filtered count
  /// (before paging) and the requested page.
  pub fn apply(&self, base: impl IntoIterator<Item = Record>) -> (u64, Vec<Record>) {
    let mut matched: Vec<Record> =
      base.into_iter().filter(|r| self.matches(r)).collect();
    matched.sort_by(|a, b| self.sort.compare(a, b));
    let total = matched.len() as u64;
    (total, self.page.window(matched))
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::record::{Address, PersonName};

  fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn with_address(id: &str, line: Option<&str>, country: Option<&str>) -> Record {
    let mut r = Record::new(id);
    r.addresses.push(Address {
      id:           format!("{id}-a{}", r.addresses.len()),
      address_line: line.map(Into::into),
      city:         None,
      country:      country.map(Into::into),
    });
    r
  }

  fn with_dates(id: &str, dates: &[Option<NaiveDate>]) -> Record {
    let mut r = Record::new(id);
    for (i, d) in dates.iter().enumerate() {
      r.dates.push(DateEntry {
        id:         format!("{id}-d{i}"),
        date_type:  Some("birth".into()),
        date_value: d.map(|d| d.and_hms_opt(13, 45, 0).unwrap()),
      });
    }
    r
  }

  fn query(filters: RecordFilters) -> RecordQuery {
    RecordQuery { filters, ..Default::default() }
  }

  fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
  }

  #[test]
  fn country_filter_matches_any_address() {
    let r1 = with_address("r1", None, Some("US"));
    let mut r2 = with_address("r2", None, Some("FR"));
    r2.addresses.push(Address {
      id:           "r2-a1".into(),
      address_line: None,
      city:         None,
      country:      Some("US".into()),
    });
    let r3 = Record::new("r3");

    let q = query(RecordFilters {
      countries: vec!["US".into()],
      ..Default::default()
    });
    let (total, page) = q.apply(vec![r1, r2, r3]);
    assert_eq!(total, 2);
    assert_eq!(ids(&page), ["r1", "r2"]);
  }

  #[test]
  fn null_country_never_matches() {
    let q = query(RecordFilters {
      countries: vec!["US".into()],
      ..Default::default()
    });
    assert!(!q.matches(&with_address("r1", Some("x"), None)));
  }

  #[test]
  fn search_is_case_insensitive_over_lines_and_names() {
    let by_line = with_address("r1", Some("12 Baker Street"), None);
    let mut by_first = Record::new("r2");
    by_first.names.push(PersonName {
      id:         "n1".into(),
      first_name: "Bakari".into(),
      last_name:  "Okafor".into(),
    });
    let mut by_last = Record::new("r3");
    by_last.names.push(PersonName {
      id:         "n2".into(),
      first_name: "Jo".into(),
      last_name:  "Mcbaker".into(),
    });
    let miss = with_address("r4", None, Some("Baker"));

    let q = query(RecordFilters {
      search: Some("BAK".into()),
      ..Default::default()
    });
    let (total, page) = q.apply(vec![by_line, by_first, by_last, miss]);
    assert_eq!(total, 3);
    assert_eq!(ids(&page), ["r1", "r2", "r3"]);
  }

  #[test]
  fn search_folds_non_ascii_case() {
    let mut r = Record::new("r1");
    r.names.push(PersonName {
      id:         "n1".into(),
      first_name: "Émile".into(),
      last_name:  "Größe".into(),
    });
    for term in ["Émile", "émile", "ÉMILE", "GRÖ"] {
      let q = query(RecordFilters { search: Some(term.into()), ..Default::default() });
      assert!(q.matches(&r), "{term}");
    }
  }

  #[test]
  fn empty_search_is_a_no_op() {
    let q = query(RecordFilters { search: Some(String::new()), ..Default::default() });
    assert!(q.matches(&Record::new("r1")));
  }

  #[test]
  fn gender_filter_compares_canonical_names() {
    let mut male = Record::new("m");
    male.gender = Some("Male".into());
    let mut lower = Record::new("l");
    lower.gender = Some("male".into());
    let unknown = Record::new("u");

    let q = query(RecordFilters { gender: GenderFilter::Male, ..Default::default() });
    let (_, page) = q.apply(vec![male.clone(), lower.clone(), unknown.clone()]);
    assert_eq!(ids(&page), ["m"]);

    let all = query(RecordFilters::default());
    assert_eq!(all.apply(vec![male, lower, unknown]).0, 3);
  }

  #[test]
  fn gender_filter_parses_any_case() {
    assert_eq!("female".parse::<GenderFilter>().unwrap(), GenderFilter::Female);
    assert_eq!("ALL".parse::<GenderFilter>().unwrap(), GenderFilter::All);
    assert!("unknown".parse::<GenderFilter>().is_err());
  }

  #[test]
  fn date_bounds_use_date_part_and_skip_nulls() {
    let on_start = with_dates("a", &[Some(ymd(2000, 1, 1))]);
    let before = with_dates("b", &[Some(ymd(1999, 12, 31)), None]);
    let only_null = with_dates("c", &[None]);

    let q = query(RecordFilters {
      start_date: Some(ymd(2000, 1, 1)),
      ..Default::default()
    });
    let (_, page) = q.apply(vec![on_start, before, only_null]);
    assert_eq!(ids(&page), ["a"]);
  }

  #[test]
  fn date_bounds_are_satisfied_independently() {
    // Neither date lies inside [2010, 2005], but each bound has a witness.
    let r = with_dates("r", &[Some(ymd(2000, 6, 1)), Some(ymd(2020, 6, 1))]);
    let q = query(RecordFilters {
      start_date: Some(ymd(2010, 1, 1)),
      end_date: Some(ymd(2005, 1, 1)),
      ..Default::default()
    });
    assert!(q.matches(&r));

    let q = query(RecordFilters {
      start_date: Some(ymd(2021, 1, 1)),
      end_date: Some(ymd(2030, 1, 1)),
      ..Default::default()
    });
    assert!(!q.matches(&r));
  }

  #[test]
  fn filter_stages_combine_by_conjunction() {
    let mut hit = with_address("hit", Some("Rue de Rivoli"), Some("FR"));
    hit.gender = Some("Female".into());
    let mut wrong_gender = hit.clone();
    wrong_gender.id = "wrong".into();
    wrong_gender.gender = Some("Male".into());

    let q = query(RecordFilters {
      search: Some("rivoli".into()),
      gender: GenderFilter::Female,
      countries: vec!["FR".into(), "BE".into()],
      ..Default::default()
    });
    let (_, page) = q.apply(vec![hit, wrong_gender]);
    assert_eq!(ids(&page), ["hit"]);
  }

  #[test]
  fn pagination_math() {
    let records: Vec<Record> = (0..25).map(|i| Record::new(format!("r{i:02}"))).collect();
    let request = |page| ListRequest { page, page_size: 10, ..Default::default() };

    let q = RecordQuery::build(request(3), DEFAULT_MAX_PAGE_SIZE).unwrap();
    let (total, page) = q.apply(records.clone());
    let envelope = Page::new(q.page, total, page);
    assert_eq!(envelope.total_count, 25);
    assert_eq!(envelope.total_pages, 3);
    assert_eq!(envelope.current_page, 3);
    assert_eq!(envelope.entities.len(), 5);
    assert_eq!(envelope.entities[0].id, "r20");

    let q = RecordQuery::build(request(4), DEFAULT_MAX_PAGE_SIZE).unwrap();
    let (total, page) = q.apply(records);
    assert_eq!(total, 25);
    assert!(page.is_empty());
  }

  #[test]
  fn empty_result_has_zero_pages() {
    let q = RecordQuery::default();
    let (total, page) = q.apply(Vec::new());
    assert_eq!(Page::new(q.page, total, page).total_pages, 0);
  }

  #[test]
  fn page_size_is_clamped() {
    let p = PageRequest::new(1, 10_000, 50).unwrap();
    assert_eq!(p.page_size, 50);
  }

  #[test]
  fn invalid_page_window_is_rejected() {
    assert!(matches!(PageRequest::new(0, 10, 100), Err(Error::Validation(_))));
    assert!(matches!(PageRequest::new(1, 0, 100), Err(Error::Validation(_))));
    assert!(matches!(PageRequest::new(-3, 10, 100), Err(Error::Validation(_))));
  }

  #[test]
  fn sort_descending_by_id() {
    let q = RecordQuery::build(
      ListRequest {
        sort_by: Some("id".into()),
        sort_order: Some("DESC".into()),
        ..Default::default()
      },
      DEFAULT_MAX_PAGE_SIZE,
    )
    .unwrap();
    let (_, page) = q.apply(["b", "c", "a"].map(Record::new));
    assert_eq!(ids(&page), ["c", "b", "a"]);
  }

  #[test]
  fn sort_by_scalar_breaks_ties_on_id() {
    let mut a = Record::new("a");
    a.deceased = true;
    let b = Record::new("b");
    let c = Record::new("c");

    let sort = Sort::parse(Some("deceased"), Some("asc")).unwrap();
    let q = RecordQuery { sort, ..Default::default() };
    let (_, page) = q.apply(vec![a, c, b]);
    assert_eq!(ids(&page), ["b", "c", "a"]);
  }

  #[test]
  fn sort_field_resolution() {
    assert_eq!(SortField::resolve("gender").unwrap(), SortField::Gender);
    assert_eq!(SortField::resolve("Deceased").unwrap(), SortField::Deceased);
    assert!(matches!(SortField::resolve("ID"), Err(Error::UnknownSortField(_))));
    assert!(matches!(SortField::resolve("names"), Err(Error::UnknownSortField(_))));
    assert_eq!(Sort::parse(Some("  "), None).unwrap(), Sort::default());
  }

  #[test]
  fn unknown_sort_field_fails_the_build() {
    let err = RecordQuery::build(
      ListRequest { sort_by: Some("city".into()), ..Default::default() },
      DEFAULT_MAX_PAGE_SIZE,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownSortField(f) if f == "city"));
  }

  #[test]
  fn page_envelope_uses_pascal_case() {
    let page: Page<Record> = Page::new(PageRequest::default(), 0, Vec::new());
    let v = serde_json::to_value(&page).unwrap();
    for key in ["TotalCount", "TotalPages", "CurrentPage", "PageSize", "Entities"] {
      assert!(v.get(key).is_some(), "missing {key}");
    }
  }
}
