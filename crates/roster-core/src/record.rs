//! The person-record aggregate.
//!
//! A [`Record`] is the root; it exclusively owns three child collections
//! (addresses, dates and names). Children are persisted and deleted together
//! with their root, and every child id is unique within its kind across the
//! whole store.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Children ────────────────────────────────────────────────────────────────

/// A postal address owned by a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
  #[serde(default)]
  pub id:           String,
  pub address_line: Option<String>,
  pub city:         Option<String>,
  pub country:      Option<String>,
}

/// A tagged date, e.g. a birth or death date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateEntry {
  #[serde(default)]
  pub id:         String,
  /// Free-form tag such as `"birth"`.
  pub date_type:  Option<String>,
  #[serde(default, with = "date_value")]
  pub date_value: Option<NaiveDateTime>,
}

/// A first/last name pair. Both parts are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersonName {
  #[serde(default)]
  pub id:         String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name:  String,
}

/// Discriminates the three child collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
  Address,
  Date,
  Name,
}

impl ChildKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Address => "address",
      Self::Date => "date",
      Self::Name => "name",
    }
  }
}

/// A single child entity of any kind, as passed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
  Address(Address),
  Date(DateEntry),
  Name(PersonName),
}

impl Child {
  pub fn id(&self) -> &str {
    match self {
      Self::Address(a) => &a.id,
      Self::Date(d) => &d.id,
      Self::Name(n) => &n.id,
    }
  }

  pub fn kind(&self) -> ChildKind {
    match self {
      Self::Address(_) => ChildKind::Address,
      Self::Date(_) => ChildKind::Date,
      Self::Name(_) => ChildKind::Name,
    }
  }
}

/// Access to the identifier every child carries.
trait Identified: Clone {
  const KIND: ChildKind;
  fn id(&self) -> &str;
  fn into_child(self) -> Child;
}

impl Identified for Address {
  const KIND: ChildKind = ChildKind::Address;
  fn id(&self) -> &str { &self.id }
  fn into_child(self) -> Child { Child::Address(self) }
}

impl Identified for DateEntry {
  const KIND: ChildKind = ChildKind::Date;
  fn id(&self) -> &str { &self.id }
  fn into_child(self) -> Child { Child::Date(self) }
}

impl Identified for PersonName {
  const KIND: ChildKind = ChildKind::Name;
  fn id(&self) -> &str { &self.id }
  fn into_child(self) -> Child { Child::Name(self) }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The root aggregate. `id` is assigned by the caller and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
  #[serde(default)]
  pub id:        String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub addresses: Vec<Address>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub dates:     Vec<DateEntry>,
  #[serde(default)]
  pub deceased:  bool,
  #[serde(default)]
  pub gender:    Option<String>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub names:     Vec<PersonName>,
}

impl Record {
  /// A record with no children.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id:        id.into(),
      addresses: Vec::new(),
      dates:     Vec::new(),
      deceased:  false,
      gender:    None,
      names:     Vec::new(),
    }
  }

  /// Check required fields before the record is handed to a store.
  pub fn validate(&self) -> Result<()> {
    require("Id", &self.id)?;
    check_children(&self.addresses)?;
    check_children(&self.dates)?;
    check_children(&self.names)?;
    unique_ids(&self.addresses)?;
    unique_ids(&self.dates)?;
    unique_ids(&self.names)?;
    check_names(&self.names)
  }

  /// Every child of the aggregate, addresses first, then dates, then names.
  pub fn children(&self) -> impl Iterator<Item = Child> + '_ {
    self
      .addresses
      .iter()
      .cloned()
      .map(Child::Address)
      .chain(self.dates.iter().cloned().map(Child::Date))
      .chain(self.names.iter().cloned().map(Child::Name))
  }

  /// Apply `patch` with merge-by-id semantics.
  ///
  /// Scalars are overwritten wholesale. A patch child whose id matches an
  /// existing child replaces it in place; a patch child with no match is
  /// dropped; existing children absent from the patch are left alone.
  ///
  /// Returns the children that were replaced, in patch order.
  pub fn merge(&mut self, patch: RecordPatch) -> Vec<Child> {
    self.deceased = patch.deceased;
    self.gender = patch.gender;

    let mut changed = Vec::new();
    merge_by_id(&mut self.addresses, patch.addresses, &mut changed);
    merge_by_id(&mut self.dates, patch.dates, &mut changed);
    merge_by_id(&mut self.names, patch.names, &mut changed);
    changed
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// Body of an update. Any `Id` on the body itself is ignored; the path id
/// selects the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordPatch {
  #[serde(default, deserialize_with = "null_as_empty")]
  pub addresses: Vec<Address>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub dates:     Vec<DateEntry>,
  #[serde(default)]
  pub deceased:  bool,
  #[serde(default)]
  pub gender:    Option<String>,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub names:     Vec<PersonName>,
}

impl RecordPatch {
  pub fn validate(&self) -> Result<()> {
    check_children(&self.addresses)?;
    check_children(&self.dates)?;
    check_children(&self.names)?;
    check_names(&self.names)
  }
}

impl From<Record> for RecordPatch {
  fn from(r: Record) -> Self {
    Self {
      addresses: r.addresses,
      dates:     r.dates,
      deceased:  r.deceased,
      gender:    r.gender,
      names:     r.names,
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn merge_by_id<T: Identified>(
  existing: &mut [T],
  updates: Vec<T>,
  changed: &mut Vec<Child>,
) {
  for update in updates {
    match existing.iter_mut().find(|e| e.id() == update.id()) {
      Some(slot) => {
        *slot = update.clone();
        changed.push(update.into_child());
      }
      None => {
        tracing::debug!(
          kind = T::KIND.as_str(),
          child_id = update.id(),
          "patch child has no matching id; ignoring"
        );
      }
    }
  }
}

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::Validation(format!("{field} is required")));
  }
  Ok(())
}

fn check_children<T: Identified>(children: &[T]) -> Result<()> {
  for child in children {
    if child.id().trim().is_empty() {
      return Err(Error::Validation(format!(
        "{} Id is required",
        T::KIND.as_str()
      )));
    }
  }
  Ok(())
}

fn unique_ids<T: Identified>(children: &[T]) -> Result<()> {
  let mut seen = HashSet::new();
  for child in children {
    if !seen.insert(child.id()) {
      return Err(Error::Validation(format!(
        "duplicate {} Id {:?}",
        T::KIND.as_str(),
        child.id()
      )));
    }
  }
  Ok(())
}

fn check_names(names: &[PersonName]) -> Result<()> {
  for name in names {
    require("FirstName", &name.first_name)?;
    require("LastName", &name.last_name)?;
  }
  Ok(())
}

// ─── DateValue encoding ──────────────────────────────────────────────────────

/// Wire and storage format for `DateValue`. The fractional part is omitted
/// when it is zero.
pub const DATE_VALUE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse a `DateValue`: a local date-time, an RFC 3339 timestamp (its wall
/// time is kept), or a bare date (midnight).
pub fn parse_date_value(s: &str) -> std::result::Result<NaiveDateTime, String> {
  if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATE_VALUE_FORMAT) {
    return Ok(dt);
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.naive_local());
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .ok_or_else(|| format!("invalid date value: {s:?}"))
}

pub fn format_date_value(dt: &NaiveDateTime) -> String {
  dt.format(DATE_VALUE_FORMAT).to_string()
}

/// An explicit `null` collection reads as empty, like an absent one.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
  D: serde::Deserializer<'de>,
  T: Deserialize<'de>,
{
  Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

mod date_value {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S>(
    value: &Option<NaiveDateTime>,
    serializer: S,
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    match value {
      Some(dt) => serializer.serialize_some(&super::format_date_value(dt)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D,
  ) -> Result<Option<NaiveDateTime>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Option::<String>::deserialize(deserializer)?
      .map(|s| super::parse_date_value(&s).map_err(D::Error::custom))
      .transpose()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn name(id: &str, first: &str, last: &str) -> PersonName {
    PersonName {
      id:         id.into(),
      first_name: first.into(),
      last_name:  last.into(),
    }
  }

  fn address(id: &str, country: &str) -> Address {
    Address {
      id:           id.into(),
      address_line: Some("1 Main St".into()),
      city:         None,
      country:      Some(country.into()),
    }
  }

  #[test]
  fn deserializes_pascal_case_payload() {
    let record: Record = serde_json::from_value(json!({
      "Id": "r1",
      "Gender": "Female",
      "Deceased": true,
      "Addresses": [{ "Id": "a1", "AddressLine": "1 Main St", "City": null, "Country": "US" }],
      "Dates": [{ "Id": "d1", "DateType": "birth", "DateValue": "1990-04-01T00:00:00" }],
      "Names": [{ "Id": "n1", "FirstName": "Ada", "LastName": "Lovelace" }]
    }))
    .unwrap();

    assert_eq!(record.id, "r1");
    assert_eq!(record.gender.as_deref(), Some("Female"));
    assert!(record.deceased);
    assert_eq!(record.addresses[0].country.as_deref(), Some("US"));
    assert_eq!(
      record.dates[0].date_value.map(|d| d.date()),
      NaiveDate::from_ymd_opt(1990, 4, 1)
    );
    assert_eq!(record.names[0], name("n1", "Ada", "Lovelace"));
  }

  #[test]
  fn missing_collections_default_to_empty() {
    let record: Record = serde_json::from_value(json!({ "Id": "r1" })).unwrap();
    assert!(record.addresses.is_empty());
    assert!(record.dates.is_empty());
    assert!(record.names.is_empty());
    assert!(!record.deceased);
    assert!(record.validate().is_ok());
  }

  #[test]
  fn null_collections_read_as_empty() {
    let record: Record = serde_json::from_value(json!({
      "Id": "r1",
      "Addresses": null,
      "Dates": null,
      "Names": null
    }))
    .unwrap();
    assert!(record.children().next().is_none());

    let patch: RecordPatch =
      serde_json::from_value(json!({ "Names": null, "Deceased": true })).unwrap();
    assert!(patch.names.is_empty());
    assert!(patch.deceased);
  }

  #[test]
  fn serializes_date_value_without_zero_fraction() {
    let entry = DateEntry {
      id:         "d1".into(),
      date_type:  None,
      date_value: parse_date_value("2001-02-03").ok(),
    };
    let v = serde_json::to_value(&entry).unwrap();
    assert_eq!(v["DateValue"], "2001-02-03T00:00:00");
    assert_eq!(v["DateType"], serde_json::Value::Null);
  }

  #[test]
  fn rfc3339_date_value_keeps_wall_time() {
    let dt = parse_date_value("2020-12-31T23:30:00-05:00").unwrap();
    assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
    assert!(parse_date_value("31/12/2020").is_err());
  }

  #[test]
  fn validate_rejects_missing_required_fields() {
    assert!(matches!(Record::new("").validate(), Err(Error::Validation(_))));

    let mut r = Record::new("r1");
    r.names.push(name("n1", "Ada", " "));
    assert!(matches!(r.validate(), Err(Error::Validation(m)) if m.contains("LastName")));

    let mut r = Record::new("r1");
    r.addresses.push(address("", "US"));
    assert!(matches!(r.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn validate_rejects_duplicate_child_ids() {
    let mut r = Record::new("r1");
    r.addresses.push(address("a1", "US"));
    r.addresses.push(address("a1", "FR"));
    assert!(matches!(r.validate(), Err(Error::Validation(m)) if m.contains("duplicate")));
  }

  #[test]
  fn merge_updates_matches_and_drops_unknown_ids() {
    let mut r = Record::new("r1");
    r.names.push(name("n1", "A", "B"));

    let patch = RecordPatch {
      names: vec![name("n1", "A2", "B2"), name("n9", "X", "Y")],
      ..Default::default()
    };
    let changed = r.merge(patch);

    assert_eq!(r.names, vec![name("n1", "A2", "B2")]);
    assert_eq!(changed, vec![Child::Name(name("n1", "A2", "B2"))]);
  }

  #[test]
  fn merge_leaves_omitted_children_untouched() {
    let mut r = Record::new("r1");
    r.addresses.push(address("a1", "US"));
    r.addresses.push(address("a2", "FR"));
    r.gender = Some("Male".into());
    r.deceased = true;

    let changed = r.merge(RecordPatch {
      addresses: vec![address("a2", "DE")],
      ..Default::default()
    });

    assert_eq!(r.addresses, vec![address("a1", "US"), address("a2", "DE")]);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].kind(), ChildKind::Address);
    // Scalars are always overwritten, even with defaults.
    assert_eq!(r.gender, None);
    assert!(!r.deceased);
  }

  #[test]
  fn patch_ignores_body_id() {
    let patch: RecordPatch = serde_json::from_value(json!({
      "Id": "someone-else",
      "Gender": "Other"
    }))
    .unwrap();
    assert_eq!(patch.gender.as_deref(), Some("Other"));
  }

  #[test]
  fn children_iterates_every_collection() {
    let mut r = Record::new("r1");
    r.addresses.push(address("a1", "US"));
    r.dates.push(DateEntry { id: "d1".into(), date_type: None, date_value: None });
    r.names.push(name("n1", "A", "B"));
    let kinds: Vec<_> = r.children().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![ChildKind::Address, ChildKind::Date, ChildKind::Name]);
  }
}
