#![allow(clippy::unwrap_used)]
// Integration tests for `MemoryDatabase` through the `Reference` / `Query` surface.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Map, Value, json};

use fireproof_api::{Error, MemoryDatabase, Priority, Reference, TransactionOutcome};

// ── Helpers ─────────────────────────────────────────────────────────

fn database(data: Value) -> Arc<MemoryDatabase> {
    Arc::new(MemoryDatabase::from_json(
        "memory://tests".parse().unwrap(),
        data,
    ))
}

fn keys(snaps: &[fireproof_api::Snapshot]) -> Vec<String> {
    snaps.iter().map(|s| s.key.clone()).collect()
}

/// Ten children `a..j` with priorities null, -1, 0, 1, 2, 3, "a", "b", "c", "d".
fn prioritized() -> Value {
    let priorities = [
        json!(null),
        json!(-1),
        json!(0),
        json!(1),
        json!(2),
        json!(3),
        json!("a"),
        json!("b"),
        json!("c"),
        json!("d"),
    ];
    let mut items = Map::new();
    for (i, priority) in priorities.into_iter().enumerate() {
        let key = char::from(b'a' + u8::try_from(i).unwrap()).to_string();
        items.insert(key, json!({ ".value": i, ".priority": priority }));
    }
    json!({ "items": items })
}

// ── Reference navigation ────────────────────────────────────────────

#[test]
fn test_reference_navigation() {
    let db = database(Value::Null);
    let root = db.reference("").unwrap();
    let child = root.child("users/alice").unwrap();

    assert_eq!(child.to_string(), "memory://tests/users/alice");
    assert_eq!(child.key(), Some("alice"));
    assert_eq!(child.parent().unwrap().path(), "users");
    assert_eq!(child.root(), root);
    assert!(root.parent().is_none());
    assert!(matches!(root.child(""), Err(Error::InvalidPath { .. })));
    assert!(matches!(root.child("a.b"), Err(Error::InvalidPath { .. })));
}

// ── Queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_priority_ordering_and_cursor() {
    let db = database(prioritized());
    let items = db.reference("items").unwrap();

    let first = items.order_by_priority().limit_to_first(3).get().await.unwrap();
    assert_eq!(keys(&first), vec!["a", "b", "c"]);
    assert_eq!(first[0].priority, None);
    assert_eq!(first[1].priority, Some(Priority::Number(-1.0)));

    let last = first.last().unwrap();
    let next = items
        .order_by_priority()
        .start_at(last.order_value(&fireproof_api::OrderBy::Priority), Some(last.key.as_str()))
        .limit_to_first(4)
        .get()
        .await
        .unwrap();
    assert_eq!(keys(&next), vec!["c", "d", "e", "f"]);
}

#[tokio::test]
async fn test_order_by_child_and_equal_to() {
    let db = database(json!({
        "people": {
            "p1": {"age": 30, "name": "ann"},
            "p2": {"age": 25, "name": "bob"},
            "p3": {"name": "cy"},
            "p4": {"age": 30, "name": "dee"},
        }
    }));
    let people = db.reference("people").unwrap();

    let by_age = people.order_by_child("age").get().await.unwrap();
    assert_eq!(keys(&by_age), vec!["p3", "p2", "p1", "p4"]);

    let thirty = people.order_by_child("age").equal_to(30, None).get().await.unwrap();
    assert_eq!(keys(&thirty), vec!["p1", "p4"]);

    let tail = people.order_by_key().limit_to_last(2).get().await.unwrap();
    assert_eq!(keys(&tail), vec!["p3", "p4"]);
}

#[tokio::test]
async fn test_fetch_of_leaf_is_empty() {
    let db = database(json!({"leaf": 5}));
    let leaf = db.reference("leaf").unwrap();
    assert!(leaf.query().get().await.unwrap().is_empty());
    assert_eq!(leaf.get().await.unwrap().value, json!(5));
}

#[tokio::test]
async fn test_zero_limit_rejected() {
    let db = database(prioritized());
    let result = db.reference("items").unwrap().query().limit_to_first(0).get().await;
    assert!(matches!(result, Err(Error::InvalidQuery(_))));
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_update_remove() {
    let db = database(Value::Null);
    let root = db.reference("").unwrap();
    let user = root.child("users/u1").unwrap();

    user.set_with_priority(json!({"name": "ann"}), Priority::from(2)).await.unwrap();
    let mut patch = Map::new();
    patch.insert("age".into(), json!(41));
    patch.insert("address/city".into(), json!("Oslo"));
    user.update(patch).await.unwrap();

    let snap = user.get().await.unwrap();
    assert_eq!(snap.value, json!({"name": "ann", "age": 41, "address": {"city": "Oslo"}}));
    assert_eq!(snap.priority, Some(Priority::Number(2.0)));

    user.set_priority(None).await.unwrap();
    assert_eq!(user.get().await.unwrap().priority, None);

    user.remove().await.unwrap();
    assert!(!user.get().await.unwrap().exists());
    assert_eq!(db.export(), Value::Null);
}

#[tokio::test]
async fn test_push_keys_are_ordered() {
    let db = database(Value::Null);
    let log = db.reference("log").unwrap();
    let mut pushed = Vec::new();
    for i in 0..5 {
        pushed.push(log.push(json!(i)).await.unwrap().key().unwrap().to_owned());
    }
    let mut sorted = pushed.clone();
    sorted.sort();
    assert_eq!(pushed, sorted);

    let values: Vec<Value> = log
        .order_by_key()
        .get()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.value)
        .collect();
    assert_eq!(values, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn test_transaction_commit_and_abort() {
    let db = database(json!({"counter": 1}));
    let counter = db.reference("counter").unwrap();

    let outcome = counter
        .transaction(Box::new(|current| {
            Some(json!(current.and_then(Value::as_i64).unwrap_or(0) + 1))
        }))
        .await
        .unwrap();
    assert!(matches!(outcome, TransactionOutcome::Committed(ref s) if s.value == json!(2)));

    let outcome = counter.transaction(Box::new(|_| None)).await.unwrap();
    assert!(matches!(outcome, TransactionOutcome::Aborted(ref s) if s.value == json!(2)));
}

// ── Listeners ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_listen_delivers_initial_and_changed_values() {
    let db = database(json!({"room": {"topic": "hi"}}));
    let topic = db.reference("room/topic").unwrap();
    let mut sub = topic.listen().unwrap();

    assert_eq!(sub.next().await.unwrap().unwrap().value, json!("hi"));

    // Unrelated writes do not notify.
    db.reference("other").unwrap().set(json!(1)).await.unwrap();
    topic.set(json!("bye")).await.unwrap();
    assert_eq!(sub.next().await.unwrap().unwrap().value, json!("bye"));

    // Writes above the listened path notify too.
    db.reference("room").unwrap().remove().await.unwrap();
    assert!(!sub.next().await.unwrap().unwrap().exists());

    assert_eq!(db.listener_count(), 1);
    drop(sub);
    assert_eq!(db.listener_count(), 0);
}

#[tokio::test]
async fn test_denied_reads_and_revoked_listeners() {
    let db = database(json!({"secret": {"x": 1}, "open": 2}));
    let secret = db.reference("secret/x").unwrap();
    let mut sub = secret.listen().unwrap();
    assert!(sub.next().await.unwrap().is_ok());

    db.deny_read("secret").unwrap();
    assert!(matches!(
        sub.next().await,
        Some(Err(Error::PermissionDenied { .. }))
    ));
    assert!(sub.next().await.is_none());

    assert!(matches!(secret.get().await, Err(Error::PermissionDenied { .. })));
    assert!(matches!(secret.listen(), Err(Error::PermissionDenied { .. })));
    assert!(db.reference("open").unwrap().get().await.is_ok());

    db.allow_read("secret").unwrap();
    assert!(secret.get().await.is_ok());
}

// ── Auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authentication_state() {
    let db = database(Value::Null);
    let root: Reference = db.reference("").unwrap();
    let mut state = root.backend().auth_state();
    assert!(state.borrow().is_none());

    let info = root
        .backend()
        .authenticate(&SecretString::from("user-1".to_string()))
        .await
        .unwrap();
    assert_eq!(info.uid, "user-1");
    state.changed().await.unwrap();
    assert_eq!(state.borrow().as_ref().map(|a| a.uid.clone()), Some("user-1".into()));

    let empty = root.backend().authenticate(&SecretString::from(String::new())).await;
    assert!(matches!(empty, Err(Error::Authentication { .. })));

    root.backend().unauthenticate();
    state.changed().await.unwrap();
    assert!(state.borrow().is_none());
}
