//! Command definitions
//!
//! Engine-level requests and their results, one variant per public
//! operation. Front ends build a `Command` and hand it to
//! [`Engine::execute`](crate::Engine::execute).

use std::time::Duration;

use crate::value::{Scalar, Value};

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert or overwrite a key; `None` TTL means no expiry
    Set {
        key: String,
        value: Value,
        ttl: Option<Duration>,
    },

    /// Read a key
    Get { key: String },

    /// Remove a key
    Delete { key: String },

    /// Check whether a key is live
    Exists { key: String },

    /// Keys whose record field equals the given value
    Query { field: String, value: Scalar },

    /// Remaining lifetime of a key
    Ttl { key: String },

    /// Evict every expired key now
    Purge,
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Mutation accepted
    Done,

    /// Value for `Get`; `None` covers missing and expired keys alike
    Value(Option<Value>),

    /// Answer for `Exists`
    Exists(bool),

    /// Matching keys for `Query`, in index order
    Keys(Vec<String>),

    /// Remaining lifetime for `Ttl`; `None` when the key is missing or never expires
    Ttl(Option<Duration>),

    /// Number of keys evicted by `Purge`
    Purged(usize),
}
