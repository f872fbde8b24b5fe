//! Value Model
//!
//! Stored values are either an opaque scalar or a flat record of named
//! scalars. Both serialize untagged, so the snapshot file is plain JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TideError};

/// A single opaque value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Equality used by index lookups
    ///
    /// Numbers compare by value across `Int` and `Float`; everything else
    /// must match exactly.
    pub fn matches(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Int(a), Scalar::Float(b)) | (Scalar::Float(b), Scalar::Int(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }

    /// NaN and infinities have no JSON form and would reload as `Null`
    pub fn is_finite(&self) -> bool {
        match self {
            Scalar::Float(x) => x.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A stored value
///
/// `Record` must stay the first variant: untagged deserialization tries
/// variants in order and a JSON object is never a valid `Scalar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Structured value; every field is indexed
    Record(BTreeMap<String, Scalar>),

    /// Opaque value; never indexed
    Scalar(Scalar),
}

impl Value {
    /// Build a record from `(field, scalar)` pairs
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Scalar>> {
        match self {
            Value::Record(fields) => Some(fields),
            Value::Scalar(_) => None,
        }
    }

    /// Parse user input: JSON objects become records, anything else is text
    pub fn parse_input(input: &str) -> Self {
        let trimmed = input.trim_start();
        if trimmed.starts_with('{') {
            if let Ok(value @ Value::Record(_)) = serde_json::from_str::<Value>(trimmed) {
                return value;
            }
        }
        Value::Scalar(Scalar::Text(input.to_string()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Record(_) => match serde_json::to_string(self) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

macro_rules! value_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

value_from_scalar!(&str, String, i64, f64, bool);

/// A single accepted write
///
/// Shared by the engine, the operation log, the transaction buffer and the
/// replication forwarder.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert or overwrite; `ttl` is relative to the moment it is applied
    Set {
        key: String,
        value: Value,
        ttl: Option<Duration>,
    },

    /// Remove a key; absent keys are not an error
    Delete { key: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. } | Mutation::Delete { key } => key,
        }
    }

    /// Reject values the snapshot cannot store faithfully
    pub fn validate(&self) -> Result<()> {
        let (key, value) = match self {
            Mutation::Set { key, value, .. } => (key, value),
            Mutation::Delete { .. } => return Ok(()),
        };

        match value {
            Value::Scalar(scalar) if !scalar.is_finite() => Err(TideError::InvalidValue(format!(
                "key {:?}: non-finite number {}",
                key, scalar
            ))),
            Value::Record(fields) => match fields.iter().find(|(_, s)| !s.is_finite()) {
                Some((field, scalar)) => Err(TideError::InvalidValue(format!(
                    "key {:?}, field {:?}: non-finite number {}",
                    key, field, scalar
                ))),
                None => Ok(()),
            },
            Value::Scalar(_) => Ok(()),
        }
    }
}
