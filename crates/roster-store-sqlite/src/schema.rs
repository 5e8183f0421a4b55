//! SQL schema for the Roster SQLite store.
//!
//! Executed once at connection startup. Child tables reference their record
//! without `ON DELETE CASCADE`: deleting a record with children fails until
//! the children are removed first.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS records (
    id        TEXT PRIMARY KEY,
    gender    TEXT,
    deceased  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS addresses (
    id            TEXT PRIMARY KEY,
    record_id     TEXT NOT NULL REFERENCES records(id),
    address_line  TEXT,
    city          TEXT,
    country       TEXT
);

CREATE TABLE IF NOT EXISTS dates (
    id          TEXT PRIMARY KEY,
    record_id   TEXT NOT NULL REFERENCES records(id),
    date_type   TEXT,
    date_value  TEXT            -- local ISO 8601 date-time or NULL
);

CREATE TABLE IF NOT EXISTS names (
    id          TEXT PRIMARY KEY,
    record_id   TEXT NOT NULL REFERENCES records(id),
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS addresses_record_idx  ON addresses(record_id);
CREATE INDEX IF NOT EXISTS addresses_country_idx ON addresses(country);
CREATE INDEX IF NOT EXISTS dates_record_idx      ON dates(record_id);
CREATE INDEX IF NOT EXISTS names_record_idx      ON names(record_id);

PRAGMA user_version = 1;
";
