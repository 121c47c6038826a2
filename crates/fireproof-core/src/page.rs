// ── Cursor paginator ──
//
// Pages through a single ordered sequence using a `QueryFn`. Fetched pages
// are cached, so moving back and forth over already-seen pages never hits
// the backend. Every key is shown on at most one page; the inclusive cursor
// row that each follow-up fetch returns is dropped against that set.
//
// At most one fetch is in flight. Concurrent `next()` calls share it and
// observe the same outcome. A reconnect bumps the generation so that a
// fetch started before it cannot land on the new sequence.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use fireproof_api::{Reference, Snapshot};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::cursor::QueryFn;
use crate::error::CoreError;
use crate::stream::Projection;

type PendingFetch = Shared<BoxFuture<'static, Result<(), CoreError>>>;

const COMPONENT: &str = "paginator";

/// Bidirectional cursor pagination over one ordered sequence.
///
/// Each page reflects the collection when it was fetched. Cached pages are
/// not refreshed, and writes between fetches can move a child ahead of or
/// behind the cursor; ordering across such writes is not guaranteed.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Paginator {
    inner: Arc<PaginatorInner>,
}

struct PaginatorInner {
    query: QueryFn,
    state: Mutex<PageState>,
    /// Items of the current page.
    visible: watch::Sender<Arc<Vec<Snapshot>>>,
}

#[derive(Default)]
struct PageState {
    root: Option<Reference>,
    generation: u64,
    pages: Vec<Arc<Vec<Snapshot>>>,
    /// Keys already placed on some page.
    presence: HashSet<String>,
    /// One-based page number; 0 before the first page arrives.
    current: usize,
    /// Number of the final page, once a fetch came back empty.
    last_page: Option<usize>,
    pending: Option<PendingFetch>,
}

impl PageState {
    /// Drop all pages and detach, invalidating any in-flight fetch.
    fn restart(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }

    fn current_items(&self) -> Arc<Vec<Snapshot>> {
        self.current
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .map_or_else(|| Arc::new(Vec::new()), Arc::clone)
    }
}

impl Paginator {
    pub fn new(query: QueryFn) -> Self {
        let (visible, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(PaginatorInner {
                query,
                state: Mutex::new(PageState::default()),
                visible,
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a fresh sequence under `root` and fetch its first page.
    pub async fn connect(&self, root: Reference) -> Result<(), CoreError> {
        {
            let mut state = self.inner.lock();
            state.restart();
            debug!(root = %root, generation = state.generation, "paginator connected");
            state.root = Some(root);
            self.inner.publish(&state);
        }
        self.next().await
    }

    /// Drop all pages. Results of fetches still in flight are discarded.
    pub fn disconnect(&self) {
        let mut state = self.inner.lock();
        if state.root.is_some() {
            debug!(generation = state.generation, "paginator disconnected");
        }
        state.restart();
        self.inner.publish(&state);
    }

    /// Reconnect to the current root, starting over from the first page.
    pub async fn reset(&self) -> Result<(), CoreError> {
        let root = self
            .inner
            .lock()
            .root
            .clone()
            .ok_or(CoreError::NotConnected { component: COMPONENT })?;
        self.connect(root).await
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// Advance one page. Cached pages are shown without a fetch; past the
    /// cache the next page is fetched, unless the sequence is exhausted.
    pub async fn next(&self) -> Result<(), CoreError> {
        let fetch = {
            let mut state = self.inner.lock();
            let Some(root) = state.root.clone() else {
                return Err(CoreError::NotConnected { component: COMPONENT });
            };

            if state.current < state.pages.len() {
                state.current += 1;
                self.inner.publish(&state);
                return Ok(());
            }
            if state.last_page == Some(state.current) {
                trace!(page = state.current, "sequence exhausted");
                return Ok(());
            }

            if let Some(pending) = &state.pending {
                pending.clone()
            } else {
                let cursor = state.pages.last().and_then(|page| page.last()).cloned();
                let fetch = Arc::clone(&self.inner)
                    .fetch(root, cursor, state.generation)
                    .boxed()
                    .shared();
                state.pending = Some(fetch.clone());
                fetch
            }
        };
        fetch.await
    }

    /// Step back one cached page. Returns `false` on the first page.
    pub fn previous(&self) -> bool {
        let mut state = self.inner.lock();
        if state.current <= 1 {
            return false;
        }
        state.current -= 1;
        self.inner.publish(&state);
        true
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn has_next(&self) -> bool {
        let state = self.inner.lock();
        state.root.is_some() && state.last_page != Some(state.current)
    }

    pub fn has_previous(&self) -> bool {
        self.inner.lock().current > 1
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().root.is_some()
    }

    /// One-based number of the page being shown; 0 when nothing is shown.
    pub fn page_number(&self) -> usize {
        self.inner.lock().current
    }

    /// Pages fetched so far.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    pub fn current_page(&self) -> Arc<Vec<Snapshot>> {
        self.inner.lock().current_items()
    }

    pub fn subscribe(&self) -> Projection<Snapshot> {
        Projection::new(self.inner.visible.subscribe())
    }
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Paginator")
            .field("root", &state.root.as_ref().map(ToString::to_string))
            .field("page", &state.current)
            .field("pages", &state.pages.len())
            .field("last_page", &state.last_page)
            .finish_non_exhaustive()
    }
}

impl PaginatorInner {
    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().expect("paginator state lock poisoned")
    }

    fn publish(&self, state: &PageState) {
        self.visible.send_replace(state.current_items());
    }

    async fn fetch(
        self: Arc<Self>,
        root: Reference,
        cursor: Option<Snapshot>,
        generation: u64,
    ) -> Result<(), CoreError> {
        trace!(root = %root, cursor = ?cursor.as_ref().map(|c| &c.key), "fetching page");
        let result = (self.query)(root, cursor).await;

        let mut guard = self.lock();
        if guard.generation != generation {
            debug!(generation, "discarding page fetched before reconnect");
            return Ok(());
        }
        guard.pending = None;
        let rows = result?;

        let state = &mut *guard;
        let fresh: Vec<Snapshot> = rows
            .into_iter()
            .filter(|row| state.presence.insert(row.key.clone()))
            .collect();

        if fresh.is_empty() {
            state.last_page = Some(state.pages.len());
            debug!(pages = state.pages.len(), "no further pages");
        } else {
            state.pages.push(Arc::new(fresh));
            state.current = state.pages.len();
            trace!(page = state.current, "page appended");
        }
        self.publish(state);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cursor::{ordered, query_fn};
    use fireproof_api::{MemoryDatabase, OrderBy};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn root() -> Reference {
        let db = Arc::new(MemoryDatabase::from_json(
            "memory://pages".parse().unwrap(),
            json!({"n": {"a": 1, "b": 2, "c": 3}}),
        ));
        db.reference("n").unwrap()
    }

    fn keys(page: &[Snapshot]) -> Vec<&str> {
        page.iter().map(|s| s.key.as_str()).collect()
    }

    #[tokio::test]
    async fn next_before_connect_is_an_error() {
        let pager = Paginator::new(ordered(OrderBy::Key, 2));
        assert_eq!(
            pager.next().await,
            Err(CoreError::NotConnected { component: "paginator" })
        );
        assert!(!pager.has_next());
    }

    #[tokio::test]
    async fn empty_sequence_has_no_pages() {
        let pager = Paginator::new(query_fn(|_, _| async { Ok::<_, CoreError>(Vec::new()) }));
        pager.connect(root()).await.unwrap();
        assert_eq!(pager.page_number(), 0);
        assert!(pager.current_page().is_empty());
        assert!(!pager.has_next());
        assert!(!pager.has_previous());
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_can_be_retried() {
        let failing = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag = Arc::clone(&failing);
        let inner = ordered(OrderBy::Key, 2);
        let pager = Paginator::new(query_fn(move |root, cursor| {
            let fail = flag.load(std::sync::atomic::Ordering::SeqCst);
            let fetch = inner(root, cursor);
            async move {
                if fail {
                    return Err(CoreError::PermissionDenied { path: "n".into() });
                }
                fetch.await
            }
        }));

        assert!(matches!(
            pager.connect(root()).await,
            Err(CoreError::PermissionDenied { .. })
        ));
        assert_eq!(pager.page_number(), 0);

        failing.store(false, std::sync::atomic::Ordering::SeqCst);
        pager.next().await.unwrap();
        assert_eq!(keys(&pager.current_page()), vec!["a", "b"]);
    }
}
