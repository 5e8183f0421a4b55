//! [`MemoryStore`] — an in-process [`RecordStore`] used by tests and demos.
//!
//! Commits are applied to a copy of the tables and swapped in only when every
//! mutation succeeds, which gives the same all-or-nothing behaviour as a
//! database transaction.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
  query::RecordQuery,
  record::{Child, ChildKind, Record},
  store::{ChangeSet, Mutation, RecordStore},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("record already exists: {0}")]
  DuplicateRecord(String),

  #[error("{} id already in use: {id}", .kind.as_str())]
  DuplicateChild { kind: ChildKind, id: String },

  #[error("record not found: {0}")]
  RecordNotFound(String),

  #[error("record {0} still owns children")]
  HasChildren(String),
}

#[derive(Debug, Clone, Default)]
struct Tables {
  records: BTreeMap<String, Record>,
  /// Owning record of every child, keyed by kind and child id.
  owners:  HashMap<(ChildKind, String), String>,
}

impl Tables {
  fn apply(&mut self, mutation: Mutation) -> Result<(), MemoryError> {
    match mutation {
      Mutation::InsertRecord(record) => {
        if self.records.contains_key(&record.id) {
          return Err(MemoryError::DuplicateRecord(record.id));
        }
        for child in record.children() {
          let key = (child.kind(), child.id().to_owned());
          if self.owners.contains_key(&key) {
            return Err(MemoryError::DuplicateChild { kind: key.0, id: key.1 });
          }
          self.owners.insert(key, record.id.clone());
        }
        self.records.insert(record.id.clone(), record);
      }

      Mutation::UpdateRoot { id, deceased, gender } => {
        let record = self
          .records
          .get_mut(&id)
          .ok_or(MemoryError::RecordNotFound(id))?;
        record.deceased = deceased;
        record.gender = gender;
      }

      Mutation::UpsertChild { parent_id, child } => {
        let key = (child.kind(), child.id().to_owned());
        let record = self
          .records
          .get_mut(&parent_id)
          .ok_or_else(|| MemoryError::RecordNotFound(parent_id.clone()))?;
        match self.owners.get(&key) {
          Some(owner) if *owner != parent_id => {
            tracing::debug!(
              kind = key.0.as_str(),
              child_id = key.1.as_str(),
              "child belongs to another record; skipping upsert"
            );
          }
          _ => {
            upsert_into(record, child);
            self.owners.insert(key, parent_id);
          }
        }
      }

      Mutation::DeleteChildrenOf(parent_id) => {
        if let Some(record) = self.records.get_mut(&parent_id) {
          for child in record.children() {
            self.owners.remove(&(child.kind(), child.id().to_owned()));
          }
          record.addresses.clear();
          record.dates.clear();
          record.names.clear();
        }
      }

      Mutation::DeleteRoot(id) => {
        let record = self
          .records
          .get(&id)
          .ok_or_else(|| MemoryError::RecordNotFound(id.clone()))?;
        if record.children().next().is_some() {
          return Err(MemoryError::HasChildren(id));
        }
        self.records.remove(&id);
      }
    }
    Ok(())
  }
}

fn upsert_into(record: &mut Record, child: Child) {
  fn replace_or_push<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> &str) {
    match items.iter().position(|i| id(i) == id(&item)) {
      Some(pos) => items[pos] = item,
      None => items.push(item),
    }
  }

  match child {
    Child::Address(a) => replace_or_push(&mut record.addresses, a, |a| a.id.as_str()),
    Child::Date(d) => replace_or_push(&mut record.dates, d, |d| d.id.as_str()),
    Child::Name(n) => replace_or_push(&mut record.names, n, |n| n.id.as_str()),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store held entirely in memory.
///
/// Cloning is cheap — clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Number of root records.
  pub async fn record_count(&self) -> usize { self.tables.read().await.records.len() }

  /// Number of children of all kinds, across every record.
  pub async fn child_count(&self) -> usize { self.tables.read().await.owners.len() }
}

impl RecordStore for MemoryStore {
  type Error = MemoryError;

  async fn get_record(&self, id: &str) -> Result<Option<Record>, MemoryError> {
    Ok(self.tables.read().await.records.get(id).cloned())
  }

  async fn query_records(
    &self,
    query: &RecordQuery,
  ) -> Result<(u64, Vec<Record>), MemoryError> {
    let tables = self.tables.read().await;
    Ok(query.apply(tables.records.values().cloned()))
  }

  async fn commit(&self, changes: ChangeSet) -> Result<(), MemoryError> {
    let mut tables = self.tables.write().await;
    let mut next = tables.clone();
    for mutation in changes.into_mutations() {
      next.apply(mutation)?;
    }
    *tables = next;
    Ok(())
  }
}
