//! Replication forwarder
//!
//! Owns the replica handle and, in background mode, the worker thread that
//! drains the queue.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};

use crate::config::ReplicationMode;
use crate::error::Result;
use crate::value::Mutation;

use super::{Replica, ReplicationStats};

enum Delivery {
    Inline(Arc<dyn Replica>),
    Queued {
        sender: Option<Sender<Mutation>>,
        worker: Option<JoinHandle<()>>,
        enqueue_timeout: Duration,
    },
}

/// Propagates accepted mutations to a replica
pub struct ReplicationForwarder {
    delivery: Delivery,
    stats: Arc<ReplicationStats>,
}

impl ReplicationForwarder {
    /// Create a forwarder; background mode spawns its worker immediately
    pub fn new(replica: Arc<dyn Replica>, mode: ReplicationMode) -> Result<Self> {
        let stats = Arc::new(ReplicationStats::default());

        let delivery = match mode {
            ReplicationMode::Synchronous => Delivery::Inline(replica),
            ReplicationMode::Background {
                queue_capacity,
                enqueue_timeout,
            } => {
                let (sender, receiver) = channel::bounded(queue_capacity);
                let worker_stats = Arc::clone(&stats);
                let worker = thread::Builder::new()
                    .name("tidekv-replication".to_string())
                    .spawn(move || run_worker(replica, receiver, worker_stats))?;

                Delivery::Queued {
                    sender: Some(sender),
                    worker: Some(worker),
                    enqueue_timeout,
                }
            }
        };

        Ok(Self { delivery, stats })
    }

    /// Hand one mutation to the replica
    ///
    /// Never fails: problems are logged and counted in [`ReplicationStats`].
    pub fn forward(&self, mutation: &Mutation) {
        match &self.delivery {
            Delivery::Inline(replica) => {
                let outcome = replica.apply(mutation);
                if let Err(e) = &outcome {
                    tracing::warn!(key = mutation.key(), error = %e, "replica rejected mutation");
                }
                self.stats.record(&outcome);
            }
            Delivery::Queued {
                sender: Some(sender),
                enqueue_timeout,
                ..
            } => match sender.send_timeout(mutation.clone(), *enqueue_timeout) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(m)) => {
                    tracing::warn!(key = m.key(), "replication queue full, mutation dropped");
                    self.stats.record_dropped();
                }
                Err(SendTimeoutError::Disconnected(m)) => {
                    tracing::warn!(key = m.key(), "replication worker gone, mutation dropped");
                    self.stats.record_dropped();
                }
            },
            Delivery::Queued { sender: None, .. } => self.stats.record_dropped(),
        }
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    /// Stop accepting mutations, drain the queue and join the worker
    pub fn shutdown(&mut self) {
        if let Delivery::Queued { sender, worker, .. } = &mut self.delivery {
            // Dropping the sender ends the worker's receive loop once drained
            sender.take();
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    tracing::error!("replication worker panicked");
                }
            }
        }
    }
}

impl Drop for ReplicationForwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(replica: Arc<dyn Replica>, receiver: Receiver<Mutation>, stats: Arc<ReplicationStats>) {
    tracing::debug!("replication worker started");

    for mutation in receiver.iter() {
        let outcome = replica.apply(&mutation);
        if let Err(e) = &outcome {
            tracing::warn!(key = mutation.key(), error = %e, "replica rejected mutation");
        }
        stats.record(&outcome);
    }

    tracing::debug!("replication worker stopped");
}
