//! Encoding and decoding helpers between Rust domain types and the values
//! stored in SQLite columns.
//!
//! `DateValue` is stored as a local ISO 8601 string without an offset, so the
//! first ten characters are always the `YYYY-MM-DD` date part. Child rows are
//! otherwise stored column-for-column.

use chrono::{NaiveDate, NaiveDateTime};
use roster_core::record::{
  Address, DateEntry, PersonName, Record, format_date_value, parse_date_value,
};

use crate::{Error, Result};

// ─── DateValue ───────────────────────────────────────────────────────────────

pub fn encode_date_value(dt: Option<&NaiveDateTime>) -> Option<String> {
  dt.map(format_date_value)
}

pub fn decode_date_value(s: &str) -> Result<NaiveDateTime> {
  parse_date_value(s).map_err(Error::DateParse)
}

/// The `YYYY-MM-DD` bound compared against `substr(date_value, 1, 10)`.
pub fn encode_date_bound(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Scalars read directly from a `records` row.
pub struct RawRecord {
  pub id:       String,
  pub gender:   Option<String>,
  pub deceased: bool,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:       row.get(0)?,
      gender:   row.get(1)?,
      deceased: row.get(2)?,
    })
  }
}

/// A `dates` row with its value still in text form.
pub struct RawDate {
  pub id:         String,
  pub date_type:  Option<String>,
  pub date_value: Option<String>,
}

impl RawDate {
  pub fn into_entry(self) -> Result<DateEntry> {
    Ok(DateEntry {
      id:         self.id,
      date_type:  self.date_type,
      date_value: self.date_value.as_deref().map(decode_date_value).transpose()?,
    })
  }
}

/// A root row plus its child rows, as loaded inside one connection call.
pub struct RawAggregate {
  pub record:    RawRecord,
  pub addresses: Vec<Address>,
  pub dates:     Vec<RawDate>,
  pub names:     Vec<PersonName>,
}

impl RawAggregate {
  pub fn into_record(self) -> Result<Record> {
    let dates = self
      .dates
      .into_iter()
      .map(RawDate::into_entry)
      .collect::<Result<Vec<_>>>()?;

    Ok(Record {
      id: self.record.id,
      addresses: self.addresses,
      dates,
      deceased: self.record.deceased,
      gender: self.record.gender,
      names: self.names,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn date_value_keeps_date_prefix() {
    let dt = NaiveDate::from_ymd_opt(1969, 7, 20)
      .and_then(|d| d.and_hms_opt(20, 17, 40))
      .unwrap();
    let encoded = encode_date_value(Some(&dt)).unwrap();
    assert_eq!(&encoded[..10], "1969-07-20");
    assert_eq!(decode_date_value(&encoded).unwrap(), dt);
    assert_eq!(encode_date_bound(dt.date()), "1969-07-20");
  }

  #[test]
  fn garbage_date_value_is_a_parse_error() {
    let raw = RawDate {
      id:         "d1".into(),
      date_type:  None,
      date_value: Some("not a date".into()),
    };
    assert!(matches!(raw.into_entry(), Err(Error::DateParse(_))));
  }
}
