// ── Snapshot value objects ──
//
// A snapshot is the point-in-time record the store returns for one
// location: key, JSON value, optional priority, and the full reference
// string it was read from.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::order;
use crate::query::OrderBy;

// ── Priority ────────────────────────────────────────────────────────

/// Sort priority attached to a node. An absent priority is `None`
/// wherever a `Priority` is optional, and sorts before every number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    Number(f64),
    String(String),
}

impl Priority {
    /// Interpret a JSON value as a priority. Anything that is not a
    /// number or a string means "no priority".
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Priority {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Priority {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Point-in-time `{key, value, priority}` record returned by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last path segment of the location (empty for the root).
    pub key: String,
    /// Node value with all store metadata stripped. `Null` if absent.
    pub value: Value,
    pub priority: Option<Priority>,
    /// Full reference string, `<store url>/<path>`.
    pub reference: String,
}

impl Snapshot {
    /// Identity used to deduplicate snapshots that may arrive from
    /// different queries: the round-tripped reference string.
    pub fn identity(&self) -> &str {
        &self.reference
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// The value this snapshot sorts by under `order`.
    pub fn order_value(&self, order: &OrderBy) -> Value {
        order::order_value(order, &self.key, &self.value, self.priority.as_ref())
    }

    /// Value at a `/`-separated child path, if present.
    pub fn child_value(&self, path: &str) -> Option<&Value> {
        order::child_value(&self.value, path)
    }
}
