//! Transaction Module
//!
//! Buffers writes and applies them to the engine as one critical section.
//!
//! Buffered writes are invisible until `commit`. Commit applies them in
//! order under a single acquisition of the engine lock, saves the snapshot
//! once and logs one line per write. There is no rollback: a persistence
//! failure leaves every write of the batch applied in memory.

use std::time::Duration;

use crate::engine::Engine;
use crate::error::Result;
use crate::value::{Mutation, Value};

/// A single-use batch of writes against one engine
///
/// `commit` and `abort` consume the transaction. Dropping it without
/// committing discards the buffer.
pub struct Transaction<'a> {
    engine: &'a Engine,
    pending: Vec<Mutation>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            pending: Vec::new(),
        }
    }

    /// Buffer a set
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        ttl: Option<Duration>,
    ) -> &mut Self {
        self.pending.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.pending.push(Mutation::Delete { key: key.into() });
        self
    }

    /// Writes buffered so far, in commit order
    pub fn pending(&self) -> &[Mutation] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every buffered write; returns how many were applied
    pub fn commit(mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        self.engine.commit_batch(&pending)?;
        tracing::debug!(writes = pending.len(), "transaction committed");
        Ok(pending.len())
    }

    /// Discard every buffered write
    pub fn abort(mut self) {
        let discarded = std::mem::take(&mut self.pending);
        tracing::debug!(writes = discarded.len(), "transaction aborted");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                writes = self.pending.len(),
                "transaction dropped without commit, writes discarded"
            );
        }
    }
}
