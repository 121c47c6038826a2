// ── Child ordering rules ──
//
// The same comparison rules the store applies server-side, so that
// cursors built from a snapshot land exactly where the store expects.
//
//   values:   null < false < true < numbers < strings < objects
//   keys:     32-bit integer keys (numerically) < all other keys (lexically)
//   ties:     broken by key

use std::cmp::Ordering;

use serde_json::Value;

use crate::query::OrderBy;
use crate::snapshot::Priority;

/// Compare two child keys.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (int_key(a), int_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// A key counts as an integer only in its canonical form ("7", not "07" or "+7").
fn int_key(key: &str) -> Option<i32> {
    let parsed: i32 = key.parse().ok()?;
    (parsed.to_string() == key).then_some(parsed)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Compare two order values (priorities, child values, or node values).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

/// Compare two order values under `order`. Key ordering compares the
/// values as keys; every other ordering uses value rules.
pub fn compare_order(order: &OrderBy, a: &Value, b: &Value) -> Ordering {
    match order {
        OrderBy::Key => compare_keys(&key_text(a), &key_text(b)),
        _ => compare_values(a, b),
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The value a child sorts by under `order`.
pub fn order_value(order: &OrderBy, key: &str, value: &Value, priority: Option<&Priority>) -> Value {
    match order {
        OrderBy::Key => Value::String(key.to_owned()),
        OrderBy::Priority => priority.map_or(Value::Null, Priority::to_json),
        OrderBy::Value => value.clone(),
        OrderBy::Child(path) => child_value(value, path).cloned().unwrap_or(Value::Null),
    }
}

/// Walk a `/`-separated path through nested objects.
pub fn child_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .try_fold(value, |node, seg| node.get(seg))
}
