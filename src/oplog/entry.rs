//! Operation log entry definitions

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TideError};
use crate::value::{Mutation, Value};

/// Kind of logged mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Set,
    Delete,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Set => f.write_str("SET"),
            OpKind::Delete => f.write_str("DELETE"),
        }
    }
}

impl FromStr for OpKind {
    type Err = TideError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SET" => Ok(OpKind::Set),
            "DELETE" => Ok(OpKind::Delete),
            other => Err(TideError::Parse(format!("unknown operation kind: {}", other))),
        }
    }
}

/// A single line in the operation log
#[derive(Debug, Clone, PartialEq)]
pub struct OpLogEntry {
    /// Wall-clock time (unix millis) the mutation was applied
    pub timestamp_ms: u64,

    pub kind: OpKind,

    pub key: String,

    /// Present for `SET` only
    pub value: Option<Value>,

    /// Relative TTL as given by the caller
    pub ttl: Option<Duration>,
}

impl OpLogEntry {
    pub fn from_mutation(mutation: &Mutation, timestamp_ms: u64) -> Self {
        match mutation {
            Mutation::Set { key, value, ttl } => Self {
                timestamp_ms,
                kind: OpKind::Set,
                key: key.clone(),
                value: Some(value.clone()),
                ttl: *ttl,
            },
            Mutation::Delete { key } => Self {
                timestamp_ms,
                kind: OpKind::Delete,
                key: key.clone(),
                value: None,
                ttl: None,
            },
        }
    }

    /// Render as one log line, without the trailing newline
    pub fn to_line(&self) -> Result<String> {
        let key = serde_json::to_string(&self.key)?;
        let value = match &self.value {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };
        let ttl = self
            .ttl
            .map(|ttl| ttl.as_secs_f64().to_string())
            .unwrap_or_default();

        Ok(format!(
            "{}\t{}\t{}\t{}\t{}",
            self.timestamp_ms, self.kind, key, value, ttl
        ))
    }

    /// Parse one log line
    pub fn parse_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.splitn(5, '\t').collect();
        if parts.len() != 5 {
            return Err(TideError::Parse(format!(
                "expected 5 tab-separated columns, got {}",
                parts.len()
            )));
        }

        let timestamp_ms = parts[0]
            .parse::<u64>()
            .map_err(|e| TideError::Parse(format!("bad timestamp {:?}: {}", parts[0], e)))?;
        let kind = parts[1].parse::<OpKind>()?;
        let key: String = serde_json::from_str(parts[2])
            .map_err(|e| TideError::Parse(format!("bad key {:?}: {}", parts[2], e)))?;

        let value = match parts[3] {
            "" => None,
            raw => Some(
                serde_json::from_str::<Value>(raw)
                    .map_err(|e| TideError::Parse(format!("bad value {:?}: {}", raw, e)))?,
            ),
        };

        let ttl = match parts[4] {
            "" => None,
            raw => {
                let secs = raw
                    .parse::<f64>()
                    .map_err(|e| TideError::Parse(format!("bad ttl {:?}: {}", raw, e)))?;
                Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| TideError::Parse(format!("bad ttl {:?}: {}", raw, e)))?,
                )
            }
        };

        Ok(Self {
            timestamp_ms,
            kind,
            key,
            value,
            ttl,
        })
    }
}

/// Read every entry from a log file, oldest first
///
/// Audit helper; a missing file reads as an empty log.
pub fn read_entries(path: &Path) -> Result<Vec<OpLogEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(OpLogEntry::parse_line(&line)?);
    }
    Ok(entries)
}
