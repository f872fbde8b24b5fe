//! # TideKV
//!
//! An embedded, single-node key-value store with:
//! - Whole-value overwrite semantics
//! - Optional per-key TTL, evicted lazily on access
//! - A field index over record values for equality lookups
//! - Transactions applied as one critical section
//! - Optional forwarding of every write to a replica
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Caller  /  Transaction (buffered)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  one lock acquisition per call/commit
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │        primary map · expiry table · index manager           │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌───────────┐        ┌──────────────┐       ┌──────────────┐
//!  │ Snapshot  │        │ Operation    │       │ Replication  │
//!  │ (JSON)    │        │ Log (audit)  │       │ Forwarder    │
//!  └───────────┘        └──────────────┘       └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod value;

pub mod index;
pub mod snapshot;
pub mod oplog;
pub mod replication;
pub mod command;
pub mod engine;
pub mod transaction;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TideError};
pub use config::Config;
pub use engine::Engine;
pub use transaction::Transaction;
pub use value::{Mutation, Scalar, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
