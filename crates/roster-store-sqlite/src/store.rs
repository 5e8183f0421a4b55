//! [`SqliteStore`] — the SQLite implementation of [`RecordStore`].

use std::path::Path;

use roster_core::{
  query::{RecordQuery, fold_case},
  record::{Address, Child, PersonName, Record},
  store::{ChangeSet, Mutation, RecordStore},
};
use rusqlite::{
  OptionalExtension as _, Transaction, functions::FunctionFlags, params,
  params_from_iter,
};

use crate::{
  Error, Result,
  encode::{RawAggregate, RawDate, RawRecord, encode_date_value},
  schema::SCHEMA,
  sql,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Roster record store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Scalar functions the compiled queries rely on. Registered per connection.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "fold_case",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let text: Option<String> = ctx.get(0)?;
      Ok(text.as_deref().map(fold_case))
    },
  )
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load the child rows of `record` in insertion order.
fn load_children(
  conn: &rusqlite::Connection,
  record: RawRecord,
) -> rusqlite::Result<RawAggregate> {
  let addresses = conn
    .prepare(
      "SELECT id, address_line, city, country FROM addresses
       WHERE record_id = ?1 ORDER BY rowid",
    )?
    .query_map(params![record.id], |row| {
      Ok(Address {
        id:           row.get(0)?,
        address_line: row.get(1)?,
        city:         row.get(2)?,
        country:      row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let dates = conn
    .prepare(
      "SELECT id, date_type, date_value FROM dates
       WHERE record_id = ?1 ORDER BY rowid",
    )?
    .query_map(params![record.id], |row| {
      Ok(RawDate {
        id:         row.get(0)?,
        date_type:  row.get(1)?,
        date_value: row.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let names = conn
    .prepare(
      "SELECT id, first_name, last_name FROM names
       WHERE record_id = ?1 ORDER BY rowid",
    )?
    .query_map(params![record.id], |row| {
      Ok(PersonName {
        id:         row.get(0)?,
        first_name: row.get(1)?,
        last_name:  row.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(RawAggregate { record, addresses, dates, names })
}

// ─── Writing ─────────────────────────────────────────────────────────────────

fn insert_child(
  tx: &Transaction<'_>,
  parent_id: &str,
  child: &Child,
) -> rusqlite::Result<()> {
  match child {
    Child::Address(a) => tx.execute(
      "INSERT INTO addresses (id, record_id, address_line, city, country)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![a.id, parent_id, a.address_line, a.city, a.country],
    )?,
    Child::Date(d) => tx.execute(
      "INSERT INTO dates (id, record_id, date_type, date_value)
       VALUES (?1, ?2, ?3, ?4)",
      params![d.id, parent_id, d.date_type, encode_date_value(d.date_value.as_ref())],
    )?,
    Child::Name(n) => tx.execute(
      "INSERT INTO names (id, record_id, first_name, last_name)
       VALUES (?1, ?2, ?3, ?4)",
      params![n.id, parent_id, n.first_name, n.last_name],
    )?,
  };
  Ok(())
}

/// Insert or update a child in place. The `WHERE` on the conflict arm keeps
/// a child owned by another record untouched. Returns the rows changed.
fn upsert_child(
  tx: &Transaction<'_>,
  parent_id: &str,
  child: &Child,
) -> rusqlite::Result<usize> {
  match child {
    Child::Address(a) => tx.execute(
      "INSERT INTO addresses (id, record_id, address_line, city, country)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT(id) DO UPDATE SET
         address_line = excluded.address_line,
         city         = excluded.city,
         country      = excluded.country
       WHERE addresses.record_id = excluded.record_id",
      params![a.id, parent_id, a.address_line, a.city, a.country],
    ),
    Child::Date(d) => tx.execute(
      "INSERT INTO dates (id, record_id, date_type, date_value)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT(id) DO UPDATE SET
         date_type  = excluded.date_type,
         date_value = excluded.date_value
       WHERE dates.record_id = excluded.record_id",
      params![d.id, parent_id, d.date_type, encode_date_value(d.date_value.as_ref())],
    ),
    Child::Name(n) => tx.execute(
      "INSERT INTO names (id, record_id, first_name, last_name)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT(id) DO UPDATE SET
         first_name = excluded.first_name,
         last_name  = excluded.last_name
       WHERE names.record_id = excluded.record_id",
      params![n.id, parent_id, n.first_name, n.last_name],
    ),
  }
}

fn record_exists(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<bool> {
  Ok(
    tx.query_row("SELECT 1 FROM records WHERE id = ?1", params![id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn apply(tx: &Transaction<'_>, mutation: Mutation) -> Result<(), tokio_rusqlite::Error> {
  match mutation {
    Mutation::InsertRecord(record) => {
      tx.execute(
        "INSERT INTO records (id, gender, deceased) VALUES (?1, ?2, ?3)",
        params![record.id, record.gender, record.deceased],
      )?;
      for child in record.children() {
        insert_child(tx, &record.id, &child)?;
      }
    }

    Mutation::UpdateRoot { id, deceased, gender } => {
      let changed = tx.execute(
        "UPDATE records SET gender = ?2, deceased = ?3 WHERE id = ?1",
        params![id, gender, deceased],
      )?;
      if changed == 0 {
        return Err(Error::RecordNotFound(id).into_call_error());
      }
    }

    Mutation::UpsertChild { parent_id, child } => {
      if !record_exists(tx, &parent_id)? {
        return Err(Error::RecordNotFound(parent_id).into_call_error());
      }
      if upsert_child(tx, &parent_id, &child)? == 0 {
        tracing::debug!(
          kind = child.kind().as_str(),
          child_id = child.id(),
          "child belongs to another record; skipping upsert"
        );
      }
    }

    Mutation::DeleteChildrenOf(parent_id) => {
      for table in ["addresses", "dates", "names"] {
        tx.execute(
          &format!("DELETE FROM {table} WHERE record_id = ?1"),
          params![parent_id],
        )?;
      }
    }

    Mutation::DeleteRoot(id) => {
      // Fails on the foreign key if any child row still references the root.
      let changed = tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;
      if changed == 0 {
        return Err(Error::RecordNotFound(id).into_call_error());
      }
    }
  }
  Ok(())
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  async fn get_record(&self, id: &str) -> Result<Option<Record>> {
    let id = id.to_owned();

    let raw: Option<RawAggregate> = self
      .conn
      .call(move |conn| {
        let root = conn
          .query_row(
            "SELECT id, gender, deceased FROM records WHERE id = ?1",
            params![id],
            RawRecord::from_row,
          )
          .optional()?;
        Ok(root.map(|r| load_children(conn, r)).transpose()?)
      })
      .await?;

    raw.map(RawAggregate::into_record).transpose()
  }

  async fn query_records(&self, query: &RecordQuery) -> Result<(u64, Vec<Record>)> {
    let compiled = sql::compile(query);

    let (total, raws): (i64, Vec<RawAggregate>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &compiled.count_sql(),
          params_from_iter(compiled.params.iter()),
          |row| row.get(0),
        )?;

        let roots = conn
          .prepare(&compiled.page_sql())?
          .query_map(params_from_iter(compiled.page_params()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let raws = roots
          .into_iter()
          .map(|r| load_children(conn, r))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, raws))
      })
      .await?;

    let records = raws
      .into_iter()
      .map(RawAggregate::into_record)
      .collect::<Result<Vec<_>>>()?;
    Ok((u64::try_from(total).unwrap_or_default(), records))
  }

  async fn commit(&self, changes: ChangeSet) -> Result<()> {
    let mutations = changes.into_mutations();
    let count = mutations.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for mutation in mutations {
          apply(&tx, mutation)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(mutations = count, "change set committed");
    Ok(())
  }
}
