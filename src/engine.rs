//! Engine Module
//!
//! The store engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the primary map, the expiry table and the index
//! - Evict expired keys lazily when they are read
//! - Persist a full snapshot and log every accepted mutation
//! - Forward accepted mutations to the replica, if one is configured

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::command::{Command, Response};
use crate::config::{Config, CorruptSnapshotPolicy};
use crate::error::{Result, TideError};
use crate::index::IndexManager;
use crate::oplog::{OpLogEntry, OpLogWriter};
use crate::replication::{Replica, ReplicationForwarder, ReplicationStats};
use crate::snapshot::{LoadOutcome, Snapshot, SnapshotCodec, SnapshotView};
use crate::transaction::Transaction;
use crate::value::{Mutation, Scalar, Value};

/// Everything guarded by the engine lock
struct State {
    /// Primary map
    store: BTreeMap<String, Value>,

    /// key → absolute expiry (unix millis)
    expiry: BTreeMap<String, u64>,

    index: IndexManager,

    snapshot: SnapshotCodec,

    oplog: OpLogWriter,
}

impl State {
    /// Rebuild from a loaded snapshot, repairing cross-structure invariants
    fn restore(loaded: Snapshot, snapshot: SnapshotCodec, oplog: OpLogWriter) -> Self {
        let Snapshot {
            store,
            mut ttl,
            index,
        } = loaded;

        let ttl_before = ttl.len();
        ttl.retain(|key, _| store.contains_key(key));
        let orphan_ttls = ttl_before - ttl.len();

        // Persisted order is kept for entries that agree with the store
        let mut index = IndexManager::restore(index);
        let stale_entries = index.retain_entries(|field, key, value| {
            store
                .get(key)
                .and_then(Value::as_record)
                .and_then(|record| record.get(field))
                == Some(value)
        });

        let mut reindexed = 0;
        for (key, value) in &store {
            if let Some(record) = value.as_record() {
                if index.fields_of(key).len() != record.len() {
                    index.index(key, value);
                    reindexed += 1;
                }
            }
        }

        if orphan_ttls + stale_entries + reindexed > 0 {
            tracing::warn!(
                orphan_ttls,
                stale_entries,
                reindexed,
                "snapshot was inconsistent, repaired on load"
            );
        }

        Self {
            store,
            expiry: ttl,
            index,
            snapshot,
            oplog,
        }
    }

    /// In-memory effect of one mutation; no I/O
    fn apply(&mut self, mutation: &Mutation, now_ms: u64) {
        match mutation {
            Mutation::Set { key, value, ttl } => {
                self.index.index(key, value);
                self.store.insert(key.clone(), value.clone());
                match ttl {
                    Some(ttl) => {
                        self.expiry.insert(key.clone(), expires_at(now_ms, *ttl));
                    }
                    None => {
                        self.expiry.remove(key);
                    }
                }
            }
            Mutation::Delete { key } => self.evict(key),
        }
    }

    fn is_expired(&self, key: &str, now_ms: u64) -> bool {
        self.expiry.get(key).map_or(false, |&at| now_ms >= at)
    }

    fn evict(&mut self, key: &str) {
        self.store.remove(key);
        self.expiry.remove(key);
        self.index.remove(key);
    }

    /// Returns true if `key` was expired and has been removed
    fn evict_if_expired(&mut self, key: &str, now_ms: u64) -> bool {
        if self.is_expired(key, now_ms) {
            tracing::debug!(key, "evicting expired key");
            self.evict(key);
            true
        } else {
            false
        }
    }

    fn save(&self) -> Result<()> {
        self.snapshot.save(&SnapshotView {
            store: &self.store,
            ttl: &self.expiry,
            index: self.index.entries(),
        })
    }
}

/// The store engine
///
/// ## Concurrency Model
///
/// One `parking_lot::Mutex` serializes every operation, reads included (a
/// read may evict). Snapshot and log I/O happen with the lock held, and so
/// does a synchronous replica call.
///
/// All writes funnel through `apply_batch`, which expects the lock to be held
/// already. Public mutations and transaction commits each take the lock
/// exactly once and never re-enter it.
pub struct Engine {
    config: Config,

    state: Mutex<State>,

    replication: Option<ReplicationForwarder>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create parent directories for the snapshot and the log
    /// 2. Load the snapshot (missing → empty, unreadable → per policy)
    /// 3. Repair inconsistencies between store, expiry table and index
    /// 4. Open the operation log for appending
    pub fn open(config: Config) -> Result<Self> {
        Self::open_inner(config, None)
    }

    /// Open an engine that forwards every accepted mutation to `replica`
    pub fn open_with_replica(config: Config, replica: Arc<dyn Replica>) -> Result<Self> {
        Self::open_inner(config, Some(replica))
    }

    /// Open with a data directory (convenience method)
    ///
    /// Uses default config with both files under `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn open_inner(config: Config, replica: Option<Arc<dyn Replica>>) -> Result<Self> {
        config.validate()?;

        for path in [&config.snapshot_path, &config.oplog_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let codec = SnapshotCodec::new(
            &config.snapshot_path,
            config.snapshot_write,
            config.sync_writes,
        );

        let loaded = match codec.load()? {
            LoadOutcome::Missing => {
                tracing::info!(path = %config.snapshot_path.display(), "no snapshot, starting empty");
                Snapshot::default()
            }
            LoadOutcome::Loaded(snapshot) => snapshot,
            LoadOutcome::Corrupt(reason) => match config.corrupt_snapshot_policy {
                CorruptSnapshotPolicy::Fail => {
                    return Err(TideError::CorruptSnapshot {
                        path: config.snapshot_path.clone(),
                        reason,
                    });
                }
                CorruptSnapshotPolicy::Reset => {
                    let moved_to = codec.quarantine()?;
                    tracing::warn!(
                        %reason,
                        moved_to = %moved_to.display(),
                        "snapshot unreadable, starting empty"
                    );
                    Snapshot::default()
                }
            },
        };

        let oplog = OpLogWriter::open(&config.oplog_path, config.sync_writes)?;
        let state = State::restore(loaded, codec, oplog);

        let replication = replica
            .map(|replica| ReplicationForwarder::new(replica, config.replication))
            .transpose()?;

        tracing::info!(
            keys = state.store.len(),
            with_ttl = state.expiry.len(),
            indexed = state.index.len(),
            replica = replication.is_some(),
            "engine opened"
        );

        Ok(Self {
            config,
            state: Mutex::new(state),
            replication,
        })
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Response> {
        match command {
            Command::Set { key, value, ttl } => {
                self.set(key, value, ttl)?;
                Ok(Response::Done)
            }
            Command::Get { key } => self.get(&key).map(Response::Value),
            Command::Delete { key } => {
                self.delete(key)?;
                Ok(Response::Done)
            }
            Command::Exists { key } => self.exists(&key).map(Response::Exists),
            Command::Query { field, value } => self.query(&field, value).map(Response::Keys),
            Command::Ttl { key } => self.ttl(&key).map(Response::Ttl),
            Command::Purge => self.purge_expired().map(Response::Purged),
        }
    }

    /// Insert or overwrite a key
    ///
    /// A `ttl` makes the key expire that long from now; `None` clears any
    /// earlier expiry. Record values replace the key's index entries.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mutation = Mutation::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        };

        let mut state = self.state.lock();
        self.apply_batch(&mut state, std::slice::from_ref(&mutation))
    }

    /// Get a value by key
    ///
    /// An expired key is evicted (and the snapshot saved) before reporting
    /// absence.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut state = self.state.lock();

        if state.evict_if_expired(key, now_millis()) {
            state.save()?;
            return Ok(None);
        }

        Ok(state.store.get(key).cloned())
    }

    /// Delete a key
    ///
    /// Deleting an absent key is not an error; it is still persisted, logged
    /// and forwarded.
    pub fn delete(&self, key: impl Into<String>) -> Result<()> {
        let mutation = Mutation::Delete { key: key.into() };

        let mut state = self.state.lock();
        self.apply_batch(&mut state, std::slice::from_ref(&mutation))
    }

    /// Whether a key is present and unexpired
    pub fn exists(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock();

        if state.evict_if_expired(key, now_millis()) {
            state.save()?;
            return Ok(false);
        }

        Ok(state.store.contains_key(key))
    }

    /// Keys whose record `field` equals `target`, in index order
    ///
    /// Expired keys among the matches are evicted and left out.
    pub fn query(&self, field: &str, target: impl Into<Scalar>) -> Result<Vec<String>> {
        let target = target.into();
        let mut state = self.state.lock();
        let now = now_millis();

        let (expired, live): (Vec<String>, Vec<String>) = state
            .index
            .query(field, &target)
            .into_iter()
            .partition(|key| state.is_expired(key, now));

        if !expired.is_empty() {
            for key in &expired {
                state.evict(key);
            }
            state.save()?;
        }

        Ok(live)
    }

    /// Remaining lifetime of a key
    ///
    /// `None` when the key is missing, expired, or has no expiry.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut state = self.state.lock();
        let now = now_millis();

        if state.evict_if_expired(key, now) {
            state.save()?;
            return Ok(None);
        }

        Ok(state
            .expiry
            .get(key)
            .map(|&at| Duration::from_millis(at.saturating_sub(now))))
    }

    /// Evict every expired key now; returns how many were removed
    ///
    /// Saves once if anything was evicted. Nothing runs this automatically.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let now = now_millis();

        let expired: Vec<String> = state
            .expiry
            .iter()
            .filter(|(_, at)| now >= **at)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.evict(key);
        }

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "purged expired keys");
            state.save()?;
        }

        Ok(expired.len())
    }

    /// Start a transaction; nothing is visible until it commits
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Close the engine gracefully
    ///
    /// Drains and stops replication, then syncs the operation log.
    pub fn close(mut self) -> Result<()> {
        if let Some(forwarder) = self.replication.as_mut() {
            forwarder.shutdown();
        }

        self.state.lock().oplog.sync()?;
        tracing::info!("engine closed");
        Ok(())
    }

    /// Apply `mutations` as one batch under a single lock acquisition
    pub(crate) fn commit_batch(&self, mutations: &[Mutation]) -> Result<()> {
        let mut state = self.state.lock();
        self.apply_batch(&mut state, mutations)
    }

    /// The single write path; the caller holds the lock
    ///
    /// Order: validate all → mutate memory → save snapshot → append log lines
    /// → forward. A rejected value leaves the batch unapplied. There is no rollback: if the save fails the mutations stay applied in
    /// memory and the error says so.
    fn apply_batch(&self, state: &mut State, mutations: &[Mutation]) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        for mutation in mutations {
            mutation.validate()?;
        }

        let now = now_millis();
        for mutation in mutations {
            tracing::debug!(key = mutation.key(), ?mutation, "applying mutation");
            state.apply(mutation, now);
        }

        state.save()?;

        for mutation in mutations {
            state.oplog.append(&OpLogEntry::from_mutation(mutation, now))?;
        }

        if let Some(forwarder) = &self.replication {
            for mutation in mutations {
                forwarder.forward(mutation);
            }
        }

        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of unexpired keys (does not evict)
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        let now = now_millis();
        state
            .store
            .keys()
            .filter(|key| !state.is_expired(key, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unexpired keys in sorted order (does not evict)
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let now = now_millis();
        state
            .store
            .keys()
            .filter(|key| !state.is_expired(key, now))
            .cloned()
            .collect()
    }

    /// Keys that currently carry an expiry, including expired-but-unread ones
    pub fn keys_with_ttl(&self) -> Vec<String> {
        self.state.lock().expiry.keys().cloned().collect()
    }

    /// Index fields `key` currently has entries under
    pub fn indexed_fields(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .index
            .fields_of(key)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Forwarding counters, if a replica is configured
    pub fn replication_stats(&self) -> Option<&ReplicationStats> {
        self.replication.as_ref().map(ReplicationForwarder::stats)
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.config.snapshot_path
    }

    pub fn oplog_path(&self) -> &Path {
        &self.config.oplog_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// A second engine can serve as a replica
impl Replica for Engine {
    fn apply(&self, mutation: &Mutation) -> Result<()> {
        self.commit_batch(std::slice::from_ref(mutation))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn expires_at(now_ms: u64, ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_add(ttl_ms)
}
