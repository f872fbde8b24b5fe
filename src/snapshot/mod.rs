//! Snapshot Module
//!
//! Persists the complete store state as one JSON document, rewritten after
//! every mutation.
//!
//! ## File Format
//! ```text
//! {
//!   "store": { "<key>": <value>, ... },
//!   "ttl":   { "<key>": <expires_at_unix_ms>, ... },
//!   "index": { "<field>": [ { "key": "<key>", "value": <scalar> }, ... ], ... }
//! }
//! ```
//!
//! Index buckets are lists so their insertion order survives a reopen.

mod codec;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::index::{IndexEntry, IndexEntryRef};
use crate::value::Value;

pub use codec::SnapshotCodec;

/// Owned snapshot, produced by loading
#[derive(Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub store: BTreeMap<String, Value>,

    #[serde(default)]
    pub ttl: BTreeMap<String, u64>,

    #[serde(default)]
    pub index: BTreeMap<String, Vec<IndexEntry>>,
}

/// Borrowed snapshot, used for saving without cloning the state
#[derive(Debug, Serialize)]
pub struct SnapshotView<'a> {
    pub store: &'a BTreeMap<String, Value>,
    pub ttl: &'a BTreeMap<String, u64>,
    pub index: BTreeMap<&'a str, Vec<IndexEntryRef<'a>>>,
}

/// Result of reading the snapshot file at open
#[derive(Debug)]
pub enum LoadOutcome {
    /// No file yet
    Missing,

    /// Parsed successfully
    Loaded(Snapshot),

    /// File exists but could not be parsed
    Corrupt(String),
}
