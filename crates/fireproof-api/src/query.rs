// ── Query builder ──
//
// Queries are plain values: every builder method consumes the query and
// returns a new one. The reference they were derived from is untouched.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::error::Error;
use crate::order::{compare_keys, compare_order};
use crate::reference::Reference;
use crate::snapshot::Snapshot;

/// How children are ordered. Priority ordering is the store default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderBy {
    Key,
    #[default]
    Priority,
    Value,
    /// Order by the value at a `/`-separated child path.
    Child(String),
}

/// Inclusive range bound: an order value plus an optional key that
/// narrows the bound among children sharing that order value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub key: Option<String>,
}

impl Bound {
    pub fn new(value: impl Into<Value>, key: Option<&str>) -> Self {
        Self {
            value: value.into(),
            key: key.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    First(usize),
    Last(usize),
}

/// Everything a backend needs to execute a query against one location.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    pub order_by: OrderBy,
    pub start: Option<Bound>,
    pub end: Option<Bound>,
    pub limit: Option<Limit>,
}

impl QueryParams {
    pub fn validate(&self) -> Result<(), Error> {
        if matches!(self.limit, Some(Limit::First(0) | Limit::Last(0))) {
            return Err(Error::InvalidQuery("limit must be a positive integer".into()));
        }
        if let OrderBy::Child(path) = &self.order_by {
            if path.split('/').all(str::is_empty) {
                return Err(Error::InvalidQuery("orderByChild requires a child path".into()));
            }
        }
        Ok(())
    }

    /// Sort, range-filter and limit a set of sibling snapshots.
    pub fn apply(&self, children: Vec<Snapshot>) -> Vec<Snapshot> {
        let mut keyed: Vec<(Value, Snapshot)> = children
            .into_iter()
            .map(|snap| (snap.order_value(&self.order_by), snap))
            .collect();

        keyed.sort_by(|(av, a), (bv, b)| {
            compare_order(&self.order_by, av, bv).then_with(|| compare_keys(&a.key, &b.key))
        });

        let mut selected: Vec<Snapshot> = keyed
            .into_iter()
            .filter(|(ov, snap)| self.after_start(ov, &snap.key) && self.before_end(ov, &snap.key))
            .map(|(_, snap)| snap)
            .collect();

        match self.limit {
            Some(Limit::First(n)) => selected.truncate(n),
            Some(Limit::Last(n)) => {
                let skip = selected.len().saturating_sub(n);
                selected.drain(..skip);
            }
            None => {}
        }
        selected
    }

    fn after_start(&self, value: &Value, key: &str) -> bool {
        self.start.as_ref().is_none_or(|bound| {
            match compare_order(&self.order_by, value, &bound.value) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => bound
                    .key
                    .as_deref()
                    .is_none_or(|k| compare_keys(key, k) != Ordering::Less),
            }
        })
    }

    fn before_end(&self, value: &Value, key: &str) -> bool {
        self.end.as_ref().is_none_or(|bound| {
            match compare_order(&self.order_by, value, &bound.value) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => bound
                    .key
                    .as_deref()
                    .is_none_or(|k| compare_keys(key, k) != Ordering::Greater),
            }
        })
    }
}

// ── Query ───────────────────────────────────────────────────────────

/// A reference plus ordering/range/limit parameters.
#[derive(Clone)]
pub struct Query {
    reference: Reference,
    params: QueryParams,
}

impl Query {
    pub(crate) fn new(reference: Reference) -> Self {
        Self {
            reference,
            params: QueryParams::default(),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.params.order_by = order;
        self
    }

    pub fn order_by_key(self) -> Self {
        self.order_by(OrderBy::Key)
    }

    pub fn order_by_priority(self) -> Self {
        self.order_by(OrderBy::Priority)
    }

    pub fn order_by_value(self) -> Self {
        self.order_by(OrderBy::Value)
    }

    pub fn order_by_child(self, path: impl Into<String>) -> Self {
        self.order_by(OrderBy::Child(path.into()))
    }

    pub fn start_at(mut self, value: impl Into<Value>, key: Option<&str>) -> Self {
        self.params.start = Some(Bound::new(value, key));
        self
    }

    pub fn end_at(mut self, value: impl Into<Value>, key: Option<&str>) -> Self {
        self.params.end = Some(Bound::new(value, key));
        self
    }

    pub fn equal_to(self, value: impl Into<Value>, key: Option<&str>) -> Self {
        let value = value.into();
        self.start_at(value.clone(), key).end_at(value, key)
    }

    pub fn limit_to_first(mut self, n: usize) -> Self {
        self.params.limit = Some(Limit::First(n));
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.params.limit = Some(Limit::Last(n));
        self
    }

    /// Fetch matching children in query order.
    pub async fn get(&self) -> Result<Vec<Snapshot>, Error> {
        self.params.validate()?;
        self.reference
            .backend()
            .fetch(self.reference.path(), &self.params)
            .await
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("reference", &self.reference.to_string())
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::snapshot::Priority;
    use serde_json::json;

    fn snap(key: &str, priority: Option<Priority>) -> Snapshot {
        Snapshot {
            key: key.into(),
            value: json!(true),
            priority,
            reference: format!("memory://t/{key}"),
        }
    }

    fn keys(snaps: &[Snapshot]) -> Vec<&str> {
        snaps.iter().map(|s| s.key.as_str()).collect()
    }

    fn mixed() -> Vec<Snapshot> {
        vec![
            snap("d", Some(Priority::from(1))),
            snap("a", None),
            snap("g", Some(Priority::from("a"))),
            snap("b", Some(Priority::from(-1))),
            snap("c", Some(Priority::from(0))),
        ]
    }

    #[test]
    fn priority_order_puts_null_first_then_numbers_then_strings() {
        let out = QueryParams::default().apply(mixed());
        assert_eq!(keys(&out), vec!["a", "b", "c", "d", "g"]);
    }

    #[test]
    fn start_at_with_key_is_inclusive() {
        let params = QueryParams {
            start: Some(Bound::new(0, Some("c"))),
            limit: Some(Limit::First(2)),
            ..QueryParams::default()
        };
        assert_eq!(keys(&params.apply(mixed())), vec!["c", "d"]);
    }

    #[test]
    fn null_cursor_with_key_skips_earlier_null_keys() {
        let mut children = mixed();
        children.push(snap("0", None));
        let params = QueryParams {
            start: Some(Bound::new(Value::Null, Some("a"))),
            ..QueryParams::default()
        };
        assert_eq!(keys(&params.apply(children)), vec!["a", "b", "c", "d", "g"]);
    }

    #[test]
    fn end_at_and_limit_to_last() {
        let params = QueryParams {
            end: Some(Bound::new(1, None)),
            limit: Some(Limit::Last(2)),
            ..QueryParams::default()
        };
        assert_eq!(keys(&params.apply(mixed())), vec!["c", "d"]);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let params = QueryParams {
            limit: Some(Limit::First(0)),
            ..QueryParams::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidQuery(_))));
    }
}
