// ── Reference handle ──
//
// Immutable pointer to one location in a backend. Children, parents and
// queries are derived as new values; nothing mutates a Reference in place.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::backend::{Backend, Subscription, TransactionFn, TransactionOutcome};
use crate::error::Error;
use crate::query::{OrderBy, Query};
use crate::snapshot::{Priority, Snapshot};

/// Characters the store never accepts inside a path segment.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Normalize a `/`-separated path: drop empty segments and reject
/// segments containing forbidden or control characters.
pub fn normalize_path(path: &str) -> Result<String, Error> {
    let mut out = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if let Some(bad) = segment
            .chars()
            .find(|c| FORBIDDEN.contains(c) || c.is_control())
        {
            return Err(Error::InvalidPath {
                path: path.to_owned(),
                reason: format!("segment '{segment}' contains forbidden character {bad:?}"),
            });
        }
        out.push(segment);
    }
    Ok(out.join("/"))
}

pub(crate) fn join_path(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{child}"),
    }
}

/// Render `<url>/<path>`, the canonical reference string.
pub(crate) fn location(url: &url::Url, path: &str) -> String {
    format!("{}/{}", url.as_str().trim_end_matches('/'), path)
}

// ── Reference ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Reference {
    backend: Arc<dyn Backend>,
    path: String,
}

impl Reference {
    pub fn new(backend: Arc<dyn Backend>, path: &str) -> Result<Self, Error> {
        Ok(Self {
            backend,
            path: normalize_path(path)?,
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Normalized path without leading or trailing slashes. Empty at the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment, or `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|k| !k.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn root(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            path: String::new(),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let parent = self.path.rsplit_once('/').map_or("", |(head, _)| head);
        Some(Self {
            backend: Arc::clone(&self.backend),
            path: parent.to_owned(),
        })
    }

    pub fn child(&self, path: &str) -> Result<Self, Error> {
        let child = normalize_path(path)?;
        if child.is_empty() {
            return Err(Error::InvalidPath {
                path: path.to_owned(),
                reason: "child path is empty".into(),
            });
        }
        Ok(Self {
            backend: Arc::clone(&self.backend),
            path: join_path(&self.path, &child),
        })
    }

    // ── Query derivation ─────────────────────────────────────────

    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    pub fn order_by(&self, order: OrderBy) -> Query {
        self.query().order_by(order)
    }

    pub fn order_by_key(&self) -> Query {
        self.query().order_by_key()
    }

    pub fn order_by_priority(&self) -> Query {
        self.query().order_by_priority()
    }

    pub fn order_by_value(&self) -> Query {
        self.query().order_by_value()
    }

    pub fn order_by_child(&self, path: impl Into<String>) -> Query {
        self.query().order_by_child(path)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Read the value at this location.
    pub async fn get(&self) -> Result<Snapshot, Error> {
        self.backend.read(&self.path).await
    }

    /// Subscribe to the value at this location. The current value is
    /// delivered first, then one snapshot per change.
    pub fn listen(&self) -> Result<Subscription, Error> {
        let handle = self.backend.listen(&self.path)?;
        Ok(Subscription::new(self.clone(), handle))
    }

    // ── Writes ───────────────────────────────────────────────────

    pub async fn set(&self, value: Value) -> Result<(), Error> {
        self.backend.set(&self.path, value, None).await
    }

    pub async fn set_with_priority(&self, value: Value, priority: Priority) -> Result<(), Error> {
        self.backend.set(&self.path, value, Some(priority)).await
    }

    pub async fn set_priority(&self, priority: Option<Priority>) -> Result<(), Error> {
        self.backend.set_priority(&self.path, priority).await
    }

    /// Write several children at once. Keys may be `/`-separated relative paths.
    pub async fn update(&self, values: Map<String, Value>) -> Result<(), Error> {
        self.backend.update(&self.path, values).await
    }

    pub async fn remove(&self) -> Result<(), Error> {
        self.backend.set(&self.path, Value::Null, None).await
    }

    /// Write `value` under a new chronologically ordered child key.
    pub async fn push(&self, value: Value) -> Result<Self, Error> {
        let child = self.child(&self.backend.push_key())?;
        child.set(value).await?;
        Ok(child)
    }

    pub async fn transaction(&self, apply: TransactionFn) -> Result<TransactionOutcome, Error> {
        self.backend.transaction(&self.path, apply).await
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.backend.url() == other.backend.url() && self.path == other.path
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&location(self.backend.url(), &self.path))
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reference").field(&self.to_string()).finish()
    }
}
