//! Replication Module
//!
//! Forwards every accepted mutation to an optional replica.
//!
//! ## Delivery
//! - `Synchronous`: the replica is called inside the primary's critical
//!   section, in commit order.
//! - `Background`: mutations go through a bounded queue to one worker thread;
//!   the primary waits at most `enqueue_timeout` for space.
//!
//! In both modes forwarding is best-effort. Replica errors and dropped
//! mutations are logged and counted, never returned to the primary caller.
//! There is no acknowledgment, retry or conflict resolution.

mod forwarder;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::value::Mutation;

pub use forwarder::ReplicationForwarder;

/// A target that mirrors mutations from a primary store
///
/// Implementations must not call back into the primary: in synchronous mode
/// they run while the primary's lock is held.
pub trait Replica: Send + Sync {
    fn apply(&self, mutation: &Mutation) -> Result<()>;
}

/// Counters for the forwarding path
#[derive(Debug, Default)]
pub struct ReplicationStats {
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl ReplicationStats {
    /// Mutations the replica accepted
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Mutations the replica rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mutations never delivered (queue full or worker gone)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &Result<()>) {
        match outcome {
            Ok(()) => self.applied.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}
