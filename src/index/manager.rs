//! Index manager implementation

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::value::{Scalar, Value};

use super::{IndexEntry, IndexEntryRef};

/// Entries for one field, in first-insertion order
#[derive(Debug, Default)]
struct FieldBucket {
    next_seq: u64,
    entries: BTreeMap<u64, (String, Scalar)>,
    positions: HashMap<String, u64>,
}

impl FieldBucket {
    /// Update in place if the key is already here, otherwise append
    fn upsert(&mut self, key: &str, value: Scalar) {
        if let Some(seq) = self.positions.get(key) {
            if let Some(entry) = self.entries.get_mut(seq) {
                entry.1 = value;
                return;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, (key.to_string(), value));
        self.positions.insert(key.to_string(), seq);
    }

    fn remove(&mut self, key: &str) {
        if let Some(seq) = self.positions.remove(key) {
            self.entries.remove(&seq);
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Secondary index over record values
///
/// Not thread-safe on its own; the engine keeps it behind its state lock.
#[derive(Debug, Default)]
pub struct IndexManager {
    /// field → bucket
    fields: BTreeMap<String, FieldBucket>,

    /// key → fields it currently has entries under
    owners: HashMap<String, BTreeSet<String>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, keeping their order
    pub fn restore(persisted: BTreeMap<String, Vec<IndexEntry>>) -> Self {
        let mut index = Self::new();
        for (field, entries) in persisted {
            for entry in entries {
                index.insert(&field, &entry.key, entry.value);
            }
        }
        index
    }

    /// Re-derive the entries for `key` from its new value
    ///
    /// Fields the key still has keep their position, fields it lost are
    /// purged, new fields are appended. A non-record value purges everything
    /// the key owned.
    pub fn index(&mut self, key: &str, value: &Value) {
        let record = match value.as_record() {
            Some(record) => record,
            None => {
                self.remove(key);
                return;
            }
        };

        if let Some(previous) = self.owners.remove(key) {
            for field in previous.iter().filter(|f| !record.contains_key(*f)) {
                self.remove_from_field(field, key);
            }
        }

        for (field, scalar) in record {
            self.insert(field, key, scalar.clone());
        }
    }

    /// Purge `key` from every field it appears under
    pub fn remove(&mut self, key: &str) {
        if let Some(fields) = self.owners.remove(key) {
            for field in &fields {
                self.remove_from_field(field, key);
            }
        }
    }

    /// Keys whose `field` matches `target`, in insertion order
    ///
    /// An unknown field yields an empty result.
    pub fn query(&self, field: &str, target: &Scalar) -> Vec<String> {
        match self.fields.get(field) {
            Some(bucket) => bucket
                .entries
                .values()
                .filter(|(_, value)| value.matches(target))
                .map(|(key, _)| key.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop every `(field, key, value)` entry the predicate rejects; returns
    /// how many were dropped
    pub fn retain_entries<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &str, &Scalar) -> bool,
    {
        let mut doomed = Vec::new();
        for (field, bucket) in &self.fields {
            for (key, value) in bucket.entries.values() {
                if !keep(field, key, value) {
                    doomed.push((field.clone(), key.clone()));
                }
            }
        }

        for (field, key) in &doomed {
            self.remove_from_field(field, key);
            if let Some(owned) = self.owners.get_mut(key) {
                owned.remove(field);
                if owned.is_empty() {
                    self.owners.remove(key);
                }
            }
        }
        doomed.len()
    }

    /// Borrowed view for snapshot serialization
    pub fn entries(&self) -> BTreeMap<&str, Vec<IndexEntryRef<'_>>> {
        self.fields
            .iter()
            .map(|(field, bucket)| {
                let entries = bucket
                    .entries
                    .values()
                    .map(|(key, value)| IndexEntryRef { key, value })
                    .collect();
                (field.as_str(), entries)
            })
            .collect()
    }

    /// Fields that currently have at least one entry
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields `key` has entries under
    pub fn fields_of(&self, key: &str) -> Vec<&str> {
        self.owners
            .get(key)
            .map(|fields| fields.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.owners.contains_key(key)
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn insert(&mut self, field: &str, key: &str, value: Scalar) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .upsert(key, value);
        self.owners
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string());
    }

    fn remove_from_field(&mut self, field: &str, key: &str) {
        if let Some(bucket) = self.fields.get_mut(field) {
            bucket.remove(key);
            if bucket.is_empty() {
                self.fields.remove(field);
            }
        }
    }
}
