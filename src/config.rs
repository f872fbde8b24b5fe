//! Configuration for TideKV
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TideError};

/// Main configuration for a TideKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Snapshot file, rewritten wholesale after every mutation
    pub snapshot_path: PathBuf,

    /// How the snapshot file is replaced on each save
    pub snapshot_write: SnapshotWriteMode,

    /// What to do when the snapshot exists but cannot be parsed
    pub corrupt_snapshot_policy: CorruptSnapshotPolicy,

    // -------------------------------------------------------------------------
    // Operation Log Configuration
    // -------------------------------------------------------------------------
    /// Append-only audit log, one line per accepted mutation
    pub oplog_path: PathBuf,

    /// fsync the snapshot and the log after every write
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// How mutations reach a configured replica
    pub replication: ReplicationMode,
}

/// Snapshot replacement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWriteMode {
    /// Truncate and rewrite the file (a crash mid-write can truncate it)
    InPlace,

    /// Write a sibling temp file, then rename it over the snapshot
    AtomicRename,
}

/// Policy for a snapshot file that exists but does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptSnapshotPolicy {
    /// Start empty; the unreadable file is moved aside to `<name>.corrupt`
    Reset,

    /// Refuse to open with `TideError::CorruptSnapshot`
    Fail,
}

/// Replica forwarding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// Call the replica inside the primary critical section
    Synchronous,

    /// Queue mutations for a worker thread
    ///
    /// The primary waits at most `enqueue_timeout` for queue space, then the
    /// mutation is dropped for the replica.
    Background {
        queue_capacity: usize,
        enqueue_timeout: Duration,
    },
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("./tidekv_data");
        Self {
            snapshot_path: data_dir.join(Config::SNAPSHOT_FILENAME),
            snapshot_write: SnapshotWriteMode::AtomicRename,
            corrupt_snapshot_policy: CorruptSnapshotPolicy::Reset,
            oplog_path: data_dir.join(Config::OPLOG_FILENAME),
            sync_writes: false,
            replication: ReplicationMode::Synchronous,
        }
    }
}

impl Config {
    pub const SNAPSHOT_FILENAME: &'static str = "store.json";
    pub const OPLOG_FILENAME: &'static str = "operations.log";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(TideError::Config("snapshot path is empty".to_string()));
        }
        if self.oplog_path.as_os_str().is_empty() {
            return Err(TideError::Config("operation log path is empty".to_string()));
        }
        if self.snapshot_path == self.oplog_path {
            return Err(TideError::Config(format!(
                "snapshot and operation log share a path: {}",
                self.snapshot_path.display()
            )));
        }
        if let ReplicationMode::Background { queue_capacity: 0, .. } = self.replication {
            return Err(TideError::Config(
                "replication queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Place the snapshot and the operation log under one directory
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.config.snapshot_path = dir.join(Config::SNAPSHOT_FILENAME);
        self.config.oplog_path = dir.join(Config::OPLOG_FILENAME);
        self
    }

    /// Set the snapshot file path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    /// Set the operation log path
    pub fn oplog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.oplog_path = path.into();
        self
    }

    /// Set the snapshot write mode
    pub fn snapshot_write(mut self, mode: SnapshotWriteMode) -> Self {
        self.config.snapshot_write = mode;
        self
    }

    /// Set the corrupt snapshot policy
    pub fn corrupt_snapshot_policy(mut self, policy: CorruptSnapshotPolicy) -> Self {
        self.config.corrupt_snapshot_policy = policy;
        self
    }

    /// fsync after every snapshot save and log append
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the replication mode
    pub fn replication(mut self, mode: ReplicationMode) -> Self {
        self.config.replication = mode;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
