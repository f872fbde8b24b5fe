//! Index Module
//!
//! Secondary index over record values, answering equality lookups on a
//! single field.
//!
//! ## Responsibilities
//! - Track `field → key → value` for every key last set with a record
//! - Keep per-field insertion order for query results
//! - Purge a key from every field it owns on overwrite or delete
//!
//! ## Data Structure Choice
//! Forward buckets per field, ordered by a per-bucket sequence number, plus a
//! reverse `key → fields` map so removals touch only the fields a key owns.
//! Lookups scan one bucket; there is no value → keys inversion.

mod manager;

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

pub use manager::IndexManager;

/// One persisted index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub value: Scalar,
}

/// Borrowed form of [`IndexEntry`] used when saving
#[derive(Debug, Serialize)]
pub struct IndexEntryRef<'a> {
    pub key: &'a str,
    pub value: &'a Scalar,
}
