//! Operation Log Module
//!
//! Append-only audit trail of accepted mutations. The engine only writes it;
//! state is always restored from the snapshot, never by replaying this log.
//!
//! ## Line Format
//! ```text
//! <timestamp_ms> \t <KIND> \t <key as JSON> \t <value as JSON | empty> \t <ttl seconds | empty>
//! ```
//!
//! `KIND` is `SET` or `DELETE`. Keys and values are JSON-encoded so tabs and
//! newlines inside them cannot break a line.

mod entry;
mod writer;

pub use entry::{read_entries, OpKind, OpLogEntry};
pub use writer::OpLogWriter;
