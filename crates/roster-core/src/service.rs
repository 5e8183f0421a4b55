//! [`RecordService`] — create, read, update, delete and list over any
//! [`RecordStore`].
//!
//! Only `create` is wrapped in the retry policy; reads, updates and deletes
//! run exactly once and surface store failures directly.

use std::sync::Arc;

use crate::{
  Error, Result,
  query::{DEFAULT_MAX_PAGE_SIZE, ListRequest, Page, RecordQuery},
  record::{Record, RecordPatch},
  retry::{FaultInjector, NeverFail, RetryPolicy},
  store::{ChangeSet, RecordStore},
};

pub struct RecordService<S> {
  store:         Arc<S>,
  retry:         RetryPolicy,
  faults:        Arc<dyn FaultInjector>,
  max_page_size: u32,
}

impl<S> RecordService<S>
where
  S: RecordStore,
{
  /// A service with the default retry policy, no injected faults and the
  /// default page-size cap.
  pub fn new(store: Arc<S>) -> Self {
    Self {
      store,
      retry: RetryPolicy::default(),
      faults: Arc::new(NeverFail),
      max_page_size: DEFAULT_MAX_PAGE_SIZE,
    }
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_faults(mut self, faults: Arc<dyn FaultInjector>) -> Self {
    self.faults = faults;
    self
  }

  pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
    self.max_page_size = max_page_size.max(1);
    self
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Persist a new aggregate with all of its children.
  pub async fn create(&self, record: Record) -> Result<Record> {
    record.validate()?;

    let store = &self.store;
    let faults = &self.faults;
    self
      .retry
      .execute(|| {
        let changes = ChangeSet::new().insert_record(record.clone());
        async move {
          if faults.should_fail() {
            tracing::warn!("injected failure while creating record");
            return Err(Error::SimulatedFailure);
          }
          store.commit(changes).await.map_err(Error::store)
        }
      })
      .await?;

    tracing::info!(id = %record.id, "record created");
    Ok(record)
  }

  /// Fetch a record with its children.
  pub async fn get(&self, id: &str) -> Result<Record> {
    self
      .store
      .get_record(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::RecordNotFound(id.to_owned()))
  }

  /// Filter, sort and page records into an envelope.
  pub async fn list(&self, request: ListRequest) -> Result<Page<Record>> {
    let query = RecordQuery::build(request, self.max_page_size)?;
    let (total, records) = self
      .store
      .query_records(&query)
      .await
      .map_err(Error::store)?;
    Ok(Page::new(query.page, total, records))
  }

  /// Overwrite the scalars and merge children by id. Returns the aggregate
  /// as stored.
  pub async fn update(&self, id: &str, patch: RecordPatch) -> Result<Record> {
    patch.validate()?;
    let mut record = self.get(id).await?;

    let changed = record.merge(patch);
    let mut changes =
      ChangeSet::new().update_root(id, record.deceased, record.gender.clone());
    for child in changed {
      changes = changes.upsert_child(id, child);
    }

    self.store.commit(changes).await.map_err(Error::store)?;
    tracing::info!(id, "record updated");
    Ok(record)
  }

  /// Delete every child, then the root, as one unit.
  pub async fn delete(&self, id: &str) -> Result<()> {
    let record = self.get(id).await?;
    let children = record.children().count();

    let changes = ChangeSet::new()
      .delete_children_of(&record.id)
      .delete_root(&record.id);
    self.store.commit(changes).await.map_err(Error::store)?;

    tracing::info!(id, children, "record deleted");
    Ok(())
  }
}
