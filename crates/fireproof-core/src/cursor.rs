// ── Paging query functions ──
//
// A `QueryFn` turns (root reference, cursor) into the next batch of child
// snapshots. The cursor is the last snapshot of the previous page, or
// `None` for the first page. Paginators and feeds are driven entirely by
// one of these, so any query shape can be paged.

use std::future::Future;
use std::sync::Arc;

use fireproof_api::{OrderBy, Reference, Snapshot};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::CoreError;

pub type QueryFn = Arc<
    dyn Fn(Reference, Option<Snapshot>) -> BoxFuture<'static, Result<Vec<Snapshot>, CoreError>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(Reference, Option<Snapshot>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Snapshot>, CoreError>> + Send + 'static,
{
    Arc::new(move |reference, cursor| f(reference, cursor).boxed())
}

/// Standard cursor paging under one ordering.
///
/// The first page is `limit_to_first(size)`. Later pages start at the
/// cursor's (order value, key) inclusive and fetch `size + 1`; the cursor
/// itself comes back as the first row and is dropped by the caller's
/// presence set, leaving `size` new rows.
pub fn ordered(order: OrderBy, size: usize) -> QueryFn {
    query_fn(move |reference: Reference, cursor: Option<Snapshot>| {
        let query = reference.order_by(order.clone());
        let query = match &cursor {
            None => query.limit_to_first(size),
            Some(last) => query
                .start_at(last.order_value(&order), Some(last.key.as_str()))
                .limit_to_first(size + 1),
        };
        async move { Ok::<_, CoreError>(query.get().await?) }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fireproof_api::MemoryDatabase;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keys(snaps: &[Snapshot]) -> Vec<&str> {
        snaps.iter().map(|s| s.key.as_str()).collect()
    }

    #[tokio::test]
    async fn cursor_page_includes_the_cursor_row() {
        let db = Arc::new(MemoryDatabase::from_json(
            "memory://cursor".parse().unwrap(),
            json!({"n": {"a": 1, "b": 2, "c": 3, "d": 4, "e": 5}}),
        ));
        let root = db.reference("n").unwrap();
        let pager = ordered(OrderBy::Key, 2);

        let first = pager(root.clone(), None).await.unwrap();
        assert_eq!(keys(&first), vec!["a", "b"]);

        let second = pager(root, first.last().cloned()).await.unwrap();
        assert_eq!(keys(&second), vec!["b", "c", "d"]);
    }
}
