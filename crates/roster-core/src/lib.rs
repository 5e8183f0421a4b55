//! Core types and behaviour for the Roster person-record service.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the record aggregate, the query builder, the retry executor, the
//! [`RecordStore`](store::RecordStore) abstraction and the service that ties
//! them together. Storage backends and the HTTP layer depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod memory;
pub mod query;
pub mod record;
pub mod retry;
pub mod service;
pub mod store;

pub use error::{Error, Result};
