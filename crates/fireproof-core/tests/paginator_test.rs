#![allow(clippy::unwrap_used)]
// Paginator behaviour against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;

use fireproof_core::{
    CoreError, MemoryDatabase, OrderBy, Paginator, Priority, QueryFn, Reference, Snapshot, ordered,
    query_fn,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Keys `a..j` with priorities null, -1, 0, 1, 2, 3, "a", "b", "c", "d".
fn items() -> Reference {
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
    let db = Arc::new(MemoryDatabase::from_json(
        "memory://pages".parse().unwrap(),
        json!({ "items": items }),
    ));
    db.reference("items").unwrap()
}

/// Wrap a query function with a call counter.
fn counted(inner: QueryFn, calls: &Arc<AtomicUsize>) -> QueryFn {
    let calls = Arc::clone(calls);
    query_fn(move |root, cursor| {
        calls.fetch_add(1, Ordering::SeqCst);
        inner(root, cursor)
    })
}

/// Wrap a query function so every call waits for a permit on `gate`.
fn gated(inner: QueryFn, gate: &Arc<Semaphore>) -> QueryFn {
    let gate = Arc::clone(gate);
    query_fn(move |root, cursor| {
        let gate = Arc::clone(&gate);
        let fetch = inner(root, cursor);
        async move {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            fetch.await
        }
    })
}

fn keys(page: &[Snapshot]) -> Vec<String> {
    page.iter().map(|s| s.key.clone()).collect()
}

// ── Sequencing ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_priority_pages_until_exhausted() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pager = Paginator::new(counted(ordered(OrderBy::Priority, 3), &calls));

    pager.connect(items()).await.unwrap();
    let first = pager.current_page();
    assert_eq!(keys(&first), vec!["a", "b", "c"]);
    assert_eq!(
        first.iter().map(|s| s.priority.clone()).collect::<Vec<_>>(),
        vec![None, Some(Priority::from(-1)), Some(Priority::from(0))]
    );
    assert!(!pager.has_previous());

    let mut seen = vec![keys(&first)];
    for _ in 0..3 {
        pager.next().await.unwrap();
        seen.push(keys(&pager.current_page()));
    }
    assert_eq!(
        seen,
        vec![
            vec!["a", "b", "c"],
            vec!["d", "e", "f"],
            vec!["g", "h", "i"],
            vec!["j"],
        ]
    );
    assert!(pager.has_next());

    // The fourth advance finds nothing new.
    pager.next().await.unwrap();
    assert_eq!(pager.page_number(), 4);
    assert_eq!(keys(&pager.current_page()), vec!["j"]);
    assert!(!pager.has_next());
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // Exhaustion is sticky and costs nothing.
    pager.next().await.unwrap();
    pager.next().await.unwrap();
    assert!(!pager.has_next());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_keys_never_repeat_across_pages() {
    // A pager that always re-returns the two rows before its cursor.
    let overlapping = query_fn(|root: Reference, cursor: Option<Snapshot>| async move {
        let all = root.order_by_key().get().await?;
        let start = cursor
            .and_then(|c| all.iter().position(|s| s.key == c.key))
            .map_or(0, |i| i.saturating_sub(1));
        Ok::<_, CoreError>(all.into_iter().skip(start).take(4).collect())
    });
    let pager = Paginator::new(overlapping);
    pager.connect(items()).await.unwrap();

    let mut union = Vec::new();
    loop {
        union.extend(keys(&pager.current_page()));
        pager.next().await.unwrap();
        if !pager.has_next() {
            break;
        }
    }
    let distinct: HashSet<&String> = union.iter().collect();
    assert_eq!(distinct.len(), union.len());
    assert_eq!(distinct.len(), 10);
}

// ── Cache replay ────────────────────────────────────────────────────

#[tokio::test]
async fn test_previous_then_next_replays_cached_page() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pager = Paginator::new(counted(ordered(OrderBy::Priority, 3), &calls));
    pager.connect(items()).await.unwrap();
    pager.next().await.unwrap();
    pager.next().await.unwrap();

    let third = pager.current_page();
    assert_eq!(pager.page_number(), 3);
    let fetched = calls.load(Ordering::SeqCst);

    assert!(pager.previous());
    assert_eq!(keys(&pager.current_page()), vec!["d", "e", "f"]);
    assert!(pager.previous());
    assert!(!pager.previous());
    assert_eq!(pager.page_number(), 1);

    pager.next().await.unwrap();
    pager.next().await.unwrap();
    let replayed = pager.current_page();
    assert_eq!(*replayed, *third);
    assert!(Arc::ptr_eq(&replayed, &third));
    assert_eq!(calls.load(Ordering::SeqCst), fetched);
}

#[tokio::test]
async fn test_reset_starts_over() {
    let pager = Paginator::new(ordered(OrderBy::Priority, 3));
    pager.connect(items()).await.unwrap();
    pager.next().await.unwrap();
    assert_eq!(pager.page_number(), 2);

    pager.reset().await.unwrap();
    assert_eq!(pager.page_number(), 1);
    assert_eq!(pager.page_count(), 1);
    assert_eq!(keys(&pager.current_page()), vec!["a", "b", "c"]);

    pager.disconnect();
    assert!(!pager.is_connected());
    assert!(pager.current_page().is_empty());
    assert!(matches!(
        pager.reset().await,
        Err(CoreError::NotConnected { .. })
    ));
}

// ── In-flight discipline ────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_next_shares_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(1));
    let pager = Paginator::new(counted(gated(ordered(OrderBy::Priority, 3), &gate), &calls));
    pager.connect(items()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Close the gate so the next fetch stays in flight.
    gate.acquire().await.unwrap().forget();

    let (first, second, ()) = tokio::join!(pager.next(), pager.next(), async {
        tokio::task::yield_now().await;
        gate.add_permits(1);
    });
    assert_eq!(first, Ok(()));
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(pager.page_number(), 2);
    assert_eq!(keys(&pager.current_page()), vec!["d", "e", "f"]);
}

#[tokio::test]
async fn test_disconnect_discards_in_flight_page() {
    let gate = Arc::new(Semaphore::new(1));
    let pager = Paginator::new(gated(ordered(OrderBy::Priority, 3), &gate));
    pager.connect(items()).await.unwrap();
    gate.acquire().await.unwrap().forget();

    let (result, ()) = tokio::join!(pager.next(), async {
        tokio::task::yield_now().await;
        pager.disconnect();
        gate.add_permits(1);
    });
    assert_eq!(result, Ok(()));
    assert_eq!(pager.page_number(), 0);
    assert_eq!(pager.page_count(), 0);
    assert!(pager.current_page().is_empty());
}

// ── Projection ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribers_see_page_changes() {
    let pager = Paginator::new(ordered(OrderBy::Priority, 3));
    let mut projection = pager.subscribe();
    assert!(projection.current().is_empty());

    pager.connect(items()).await.unwrap();
    let page = projection.changed().await.unwrap();
    assert_eq!(keys(&page), vec!["a", "b", "c"]);

    pager.next().await.unwrap();
    assert_eq!(keys(&projection.latest()), vec!["d", "e", "f"]);
    let values: Vec<Value> = projection.latest().iter().map(|s| s.value.clone()).collect();
    assert_eq!(values, vec![json!(3), json!(4), json!(5)]);
}
