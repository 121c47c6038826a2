// ── Multi-source feed ──
//
// Merges several ordered child collections into one append-only list.
// Each `more()` round fetches the next batch from every source in
// parallel, keeps only snapshots whose identity has not been seen before,
// transforms them, filters the batch, sorts it and appends it. Items
// already shown are never reordered or removed.
//
// Sources advance independently: each keeps the last snapshot it returned
// as its cursor, including rows another source had already claimed.
// Identity dedup only decides what is transformed and shown.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use fireproof_api::{Reference, Snapshot};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, try_join_all};
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::cursor::QueryFn;
use crate::error::CoreError;
use crate::path;
use crate::stream::Projection;

pub type TransformFn<T> =
    Arc<dyn Fn(Snapshot, Reference) -> BoxFuture<'static, Result<T, CoreError>> + Send + Sync>;

/// Batch filter: `(item, index in batch, whole batch, items already shown)`.
pub type FilterFn<T> = Arc<dyn Fn(&T, usize, &[Arc<T>], &[Arc<T>]) -> bool + Send + Sync>;

pub type SortFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Computes the deduplication identity of a source snapshot.
pub type IdentityFn = Arc<dyn Fn(&Snapshot) -> String + Send + Sync>;

type PendingRound = Shared<BoxFuture<'static, Result<(), CoreError>>>;

const COMPONENT: &str = "feed";

// ── Builder ─────────────────────────────────────────────────────────

/// Configures a [`Feed`]. Set the transform first: it fixes the item type
/// that filter and sort callbacks see.
pub struct FeedBuilder<T> {
    paths: Vec<String>,
    query: QueryFn,
    transform: TransformFn<T>,
    filter: Option<FilterFn<T>>,
    sort: Option<SortFn<T>>,
    identity: IdentityFn,
}

impl FeedBuilder<Snapshot> {
    /// A feed over `paths` (relative to the root it will connect to),
    /// paged by `query`. Items are the source snapshots themselves.
    pub fn new<S: AsRef<str>>(paths: &[S], query: QueryFn) -> Self {
        Self {
            paths: paths.iter().map(|p| p.as_ref().to_owned()).collect(),
            query,
            transform: Arc::new(|snapshot: Snapshot, _root: Reference| {
                futures_util::future::ready(Ok::<_, CoreError>(snapshot)).boxed()
            }),
            filter: None,
            sort: None,
            identity: Arc::new(|snapshot: &Snapshot| snapshot.identity().to_owned()),
        }
    }
}

impl<T: Send + Sync + 'static> FeedBuilder<T> {
    /// Map each new snapshot to an item. Resets any filter or sort.
    pub fn transform<U, F, Fut>(self, f: F) -> FeedBuilder<U>
    where
        F: Fn(Snapshot, Reference) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, CoreError>> + Send + 'static,
    {
        FeedBuilder {
            paths: self.paths,
            query: self.query,
            transform: Arc::new(move |snapshot: Snapshot, root: Reference| f(snapshot, root).boxed()),
            filter: None,
            sort: None,
            identity: self.identity,
        }
    }

    pub fn filter(
        mut self,
        f: impl Fn(&T, usize, &[Arc<T>], &[Arc<T>]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(f));
        self
    }

    /// Order each batch before it is appended. Without a comparator the
    /// batch is ordered by source reference string.
    pub fn sort(mut self, f: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Arc::new(f));
        self
    }

    /// Override deduplication identity. Defaults to the reference string,
    /// so the same key under two different sources counts twice.
    pub fn identity(mut self, f: impl Fn(&Snapshot) -> String + Send + Sync + 'static) -> Self {
        self.identity = Arc::new(f);
        self
    }

    pub fn build(self) -> Result<Feed<T>, CoreError> {
        let mut paths = Vec::with_capacity(self.paths.len());
        for raw in &self.paths {
            let path = path::validate(raw)?;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        let (visible, _) = watch::channel(Arc::new(Vec::new()));
        Ok(Feed {
            inner: Arc::new(FeedInner {
                paths,
                query: self.query,
                transform: self.transform,
                filter: self.filter,
                sort: self.sort,
                identity: self.identity,
                state: Mutex::new(FeedState::default()),
                visible,
            }),
        })
    }
}

// ── Feed ────────────────────────────────────────────────────────────

/// Append-only aggregation over several ordered sources.
///
/// Cheap to clone; clones share state.
pub struct Feed<T> {
    inner: Arc<FeedInner<T>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct FeedInner<T> {
    paths: Vec<String>,
    query: QueryFn,
    transform: TransformFn<T>,
    filter: Option<FilterFn<T>>,
    sort: Option<SortFn<T>>,
    identity: IdentityFn,
    state: Mutex<FeedState<T>>,
    visible: watch::Sender<Arc<Vec<Arc<T>>>>,
}

struct FeedState<T> {
    root: Option<Reference>,
    generation: u64,
    /// Per-source cursor, in source order.
    positions: IndexMap<String, Option<Snapshot>>,
    /// Identities already taken.
    presence: HashSet<String>,
    items: Vec<Arc<T>>,
    pending: Option<PendingRound>,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            root: None,
            generation: 0,
            positions: IndexMap::new(),
            presence: HashSet::new(),
            items: Vec::new(),
            pending: None,
        }
    }
}

impl<T> FeedState<T> {
    fn restart(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }
}

/// A snapshot accepted in a round, before its transform has run.
struct Accepted {
    reference: String,
    snapshot: Snapshot,
}

impl<T: Send + Sync + 'static> Feed<T> {
    /// Attach to `root`, resetting every source to its beginning. Does not
    /// fetch; call [`more()`](Self::more) for the first batch.
    pub fn connect(&self, root: Reference) {
        let mut state = self.inner.lock();
        state.restart();
        state.positions = self.inner.paths.iter().map(|p| (p.clone(), None)).collect();
        debug!(root = %root, sources = self.inner.paths.len(), "feed connected");
        state.root = Some(root);
        self.inner.publish(&state);
    }

    /// Drop all items and cursors. Rounds still in flight are discarded.
    pub fn disconnect(&self) {
        let mut state = self.inner.lock();
        if state.root.is_some() {
            debug!(generation = state.generation, "feed disconnected");
        }
        state.restart();
        self.inner.publish(&state);
    }

    /// Fetch the next batch from every source and append what is new.
    /// Concurrent calls share a single round.
    pub async fn more(&self) -> Result<(), CoreError> {
        let round = {
            let mut state = self.inner.lock();
            let Some(root) = state.root.clone() else {
                return Err(CoreError::NotConnected { component: COMPONENT });
            };
            if let Some(pending) = &state.pending {
                pending.clone()
            } else {
                let cursors: Vec<(String, Option<Snapshot>)> = state
                    .positions
                    .iter()
                    .map(|(path, cursor)| (path.clone(), cursor.clone()))
                    .collect();
                let round = Arc::clone(&self.inner)
                    .round(root, cursors, state.generation)
                    .boxed()
                    .shared();
                state.pending = Some(round.clone());
                round
            }
        };
        round.await
    }

    pub fn items(&self) -> Arc<Vec<Arc<T>>> {
        self.inner.visible.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().root.is_some()
    }

    pub fn paths(&self) -> &[String] {
        &self.inner.paths
    }

    /// Current cursor of one source.
    pub fn position(&self, path: &str) -> Option<Snapshot> {
        let path = path::validate(path).ok()?;
        self.inner.lock().positions.get(&path).cloned().flatten()
    }

    pub fn subscribe(&self) -> Projection<Arc<T>> {
        Projection::new(self.inner.visible.subscribe())
    }
}

impl<T> std::fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("paths", &self.inner.paths)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> FeedInner<T> {
    fn lock(&self) -> MutexGuard<'_, FeedState<T>> {
        self.state.lock().expect("feed state lock poisoned")
    }

    fn publish(&self, state: &FeedState<T>) {
        self.visible.send_replace(Arc::new(state.items.clone()));
    }

    async fn round(
        self: Arc<Self>,
        root: Reference,
        cursors: Vec<(String, Option<Snapshot>)>,
        generation: u64,
    ) -> Result<(), CoreError> {
        let result = self.run_round(&root, cursors, generation).await;
        let mut state = self.lock();
        if state.generation == generation {
            state.pending = None;
        }
        result
    }

    async fn run_round(
        &self,
        root: &Reference,
        cursors: Vec<(String, Option<Snapshot>)>,
        generation: u64,
    ) -> Result<(), CoreError> {
        // 1. Fetch every source in parallel.
        let fetches = cursors.into_iter().map(|(path, cursor)| {
            let query = Arc::clone(&self.query);
            let source = root.child(&path);
            async move {
                let rows = query(source?, cursor).await?;
                Ok::<_, CoreError>((path, rows))
            }
        });
        let batches = try_join_all(fetches).await?;

        // 2. Claim identities and advance cursors.
        let accepted = {
            let mut guard = self.lock();
            if guard.generation != generation {
                debug!(generation, "discarding feed round fetched before reconnect");
                return Ok(());
            }
            let state = &mut *guard;
            let mut accepted = Vec::new();
            for (path, rows) in batches {
                if let Some(last) = rows.last() {
                    state.positions.insert(path.clone(), Some(last.clone()));
                }
                let mut taken = 0usize;
                for row in rows {
                    if !state.presence.insert((self.identity)(&row)) {
                        continue;
                    }
                    taken += 1;
                    accepted.push(Accepted {
                        reference: row.reference.clone(),
                        snapshot: row,
                    });
                }
                trace!(path, taken, "source batch claimed");
            }
            accepted
        };

        // 3. Transform in batch order.
        let transforms = accepted.into_iter().map(|entry| {
            let transformed = (self.transform)(entry.snapshot, root.clone());
            async move { Ok::<_, CoreError>((entry.reference, Arc::new(transformed.await?))) }
        });
        let mut batch: Vec<(String, Arc<T>)> = try_join_all(transforms).await?;

        // 4. Filter, sort and append.
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, "discarding feed round transformed before reconnect");
            return Ok(());
        }
        if let Some(filter) = &self.filter {
            let items: Vec<Arc<T>> = batch.iter().map(|(_, item)| Arc::clone(item)).collect();
            let mut index = 0usize;
            batch.retain(|(_, item)| {
                let keep = filter(&**item, index, &items, &state.items);
                index += 1;
                keep
            });
        }
        match &self.sort {
            Some(compare) => batch.sort_by(|(_, a), (_, b)| compare(&**a, &**b)),
            None => batch.sort_by(|(a, _), (b, _)| a.cmp(b)),
        }
        let appended = batch.len();
        state.items.extend(batch.into_iter().map(|(_, item)| item));
        debug!(appended, total = state.items.len(), "feed round appended");
        self.publish(&state);
        Ok(())
    }
}
