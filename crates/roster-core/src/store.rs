//! The `RecordStore` trait and the unit-of-work type it commits.
//!
//! The trait is implemented by storage backends (the in-memory
//! [`MemoryStore`](crate::memory::MemoryStore) and `roster-store-sqlite`).
//! Higher layers depend on this abstraction, not on any concrete backend.
//!
//! Stores never cascade implicitly. Removing an aggregate means deleting its
//! children first and its root second, inside one [`ChangeSet`].

use std::future::Future;

use crate::{
  query::RecordQuery,
  record::{Child, Record},
};

// ─── Unit of work ────────────────────────────────────────────────────────────

/// A single write against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  /// Insert a new root together with all of its children.
  InsertRecord(Record),
  /// Overwrite the scalar fields of an existing root.
  UpdateRoot {
    id:       String,
    deceased: bool,
    gender:   Option<String>,
  },
  /// Update a child owned by `parent_id` in place, or insert it if no child
  /// of that kind has its id. A child owned by a different parent is never
  /// touched.
  UpsertChild { parent_id: String, child: Child },
  /// Delete every child owned by `parent_id`.
  DeleteChildrenOf(String),
  /// Delete a root. Fails if the root still owns children.
  DeleteRoot(String),
}

/// An ordered batch of mutations that a store applies atomically: either
/// every mutation takes effect or none does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
  mutations: Vec<Mutation>,
}

impl ChangeSet {
  pub fn new() -> Self { Self::default() }

  pub fn insert_record(mut self, record: Record) -> Self {
    self.mutations.push(Mutation::InsertRecord(record));
    self
  }

  pub fn update_root(
    mut self,
    id: impl Into<String>,
    deceased: bool,
    gender: Option<String>,
  ) -> Self {
    self.mutations.push(Mutation::UpdateRoot { id: id.into(), deceased, gender });
    self
  }

  pub fn upsert_child(mut self, parent_id: impl Into<String>, child: Child) -> Self {
    self.mutations.push(Mutation::UpsertChild { parent_id: parent_id.into(), child });
    self
  }

  pub fn delete_children_of(mut self, parent_id: impl Into<String>) -> Self {
    self.mutations.push(Mutation::DeleteChildrenOf(parent_id.into()));
    self
  }

  pub fn delete_root(mut self, id: impl Into<String>) -> Self {
    self.mutations.push(Mutation::DeleteRoot(id.into()));
    self
  }

  pub fn is_empty(&self) -> bool { self.mutations.is_empty() }

  pub fn mutations(&self) -> &[Mutation] { &self.mutations }

  pub fn into_mutations(self) -> Vec<Mutation> { self.mutations }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a record store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch a record with all of its children. Returns `None` if not found.
  fn get_record<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  /// Evaluate a built query. Returns the number of records matching the
  /// filters (before paging) and the requested page, children included.
  fn query_records<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<(u64, Vec<Record>), Self::Error>> + Send + 'a;

  /// Apply every mutation in `changes`, or none of them.
  fn commit(
    &self,
    changes: ChangeSet,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
