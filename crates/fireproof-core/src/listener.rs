// ── Live listener registry ──
//
// Keeps value listeners alive for whichever paths were requested during
// the current render cycle and tears down the rest on `tick()`. Values,
// priorities and errors are kept per path in concurrent maps so readers
// never wait on a subscription task.
//
// A path with `Some(watcher)` in `watchers` has an active subscription.
// `None` marks a subscription that died; the next `add` re-establishes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use fireproof_api::{Priority, Reference, Snapshot, Subscription};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::path;

struct Watcher {
    /// Registry-local id; guards against late events from a replaced task.
    id: u64,
    /// Backend listener id, unregistered synchronously on removal.
    listen_id: u64,
    cancel: CancellationToken,
}

pub struct ListenerRegistry {
    root: Reference,
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    watchers: DashMap<String, Option<Watcher>>,
    /// Paths requested since the last sweep.
    live: DashSet<String>,
    values: DashMap<String, Value>,
    priorities: DashMap<String, Priority>,
    errors: DashMap<String, CoreError>,
    next_watcher: AtomicU64,
    /// Bumped on every observable change.
    version: watch::Sender<u64>,
}

impl ListenerRegistry {
    pub fn new(root: Reference) -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            root,
            inner: Arc::new(RegistryInner {
                watchers: DashMap::new(),
                live: DashSet::new(),
                values: DashMap::new(),
                priorities: DashMap::new(),
                errors: DashMap::new(),
                next_watcher: AtomicU64::new(1),
                version,
            }),
        }
    }

    pub fn root(&self) -> &Reference {
        &self.root
    }

    /// Mark `path` live for this cycle, subscribing if it has no active
    /// listener. Must be called from within a tokio runtime.
    ///
    /// A subscription that cannot be established is recorded as dead with
    /// its error, and the error is also returned.
    pub fn add(&self, path: &str) -> Result<(), CoreError> {
        let path = path::validate(path)?;
        self.inner.live.insert(path.clone());

        // The entry stays locked until the watcher is in place, so
        // concurrent adds of one path subscribe once.
        let mut slot = match self.inner.watchers.entry(path.clone()) {
            Entry::Occupied(entry) if entry.get().is_some() => return Ok(()),
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => entry.insert(None),
        };

        let subscription = match self.root.child(&path).and_then(|r| r.listen()) {
            Ok(subscription) => subscription,
            Err(e) => {
                drop(slot);
                let err = CoreError::from(e);
                warn!(path, error = %err, "listener could not be established");
                self.inner.errors.insert(path, err.clone());
                self.inner.bump_version();
                return Err(err);
            }
        };

        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(Watcher {
            id,
            listen_id: subscription.id(),
            cancel: cancel.clone(),
        });
        drop(slot);
        debug!(path, id, "listener added");

        tokio::spawn(watch_path(
            Arc::clone(&self.inner),
            path,
            id,
            subscription,
            cancel,
        ));
        Ok(())
    }

    /// Unsubscribe `path` and forget everything recorded for it.
    pub fn remove(&self, path: &str) {
        let Ok(path) = path::validate(path) else {
            return;
        };
        if let Some((_, Some(watcher))) = self.inner.watchers.remove(&path) {
            watcher.cancel.cancel();
            self.root.backend().unlisten(watcher.listen_id);
            debug!(path, id = watcher.id, "listener removed");
        }
        self.inner.values.remove(&path);
        self.inner.priorities.remove(&path);
        self.inner.errors.remove(&path);
        self.inner.bump_version();
    }

    /// Remove every listener, active or dead.
    pub fn clear(&self) {
        let paths: Vec<String> = self
            .inner
            .watchers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for path in &paths {
            self.remove(path);
        }
        self.inner.live.clear();
        if !paths.is_empty() {
            debug!(count = paths.len(), "listeners cleared");
        }
    }

    /// End the current cycle: remove listeners not requested since the
    /// previous sweep, then start a fresh cycle. Returns how many were removed.
    pub fn tick(&self) -> usize {
        let stale: Vec<String> = self
            .inner
            .watchers
            .iter()
            .filter(|entry| !self.inner.live.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for path in &stale {
            self.remove(path);
        }
        self.inner.live.clear();
        trace!(swept = stale.len(), remaining = self.len(), "listener sweep");
        stale.len()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn value(&self, path: &str) -> Option<Value> {
        let path = path::validate(path).ok()?;
        self.inner.values.get(&path).map(|v| v.value().clone())
    }

    pub fn priority(&self, path: &str) -> Option<Priority> {
        let path = path::validate(path).ok()?;
        self.inner.priorities.get(&path).map(|p| p.value().clone())
    }

    pub fn error(&self, path: &str) -> Option<CoreError> {
        let path = path::validate(path).ok()?;
        self.inner.errors.get(&path).map(|e| e.value().clone())
    }

    /// Whether `path` has an active (not dead) subscription.
    pub fn is_listening(&self, path: &str) -> bool {
        path::validate(path).is_ok_and(|path| {
            self.inner
                .watchers
                .get(&path)
                .is_some_and(|w| w.value().is_some())
        })
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.inner
            .watchers
            .iter()
            .filter(|entry| entry.value().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version counter bumped whenever a value, priority or error changes.
    pub fn changed(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("root", &self.root.to_string())
            .field("active", &self.len())
            .finish_non_exhaustive()
    }
}

// ── Subscription task ───────────────────────────────────────────────

async fn watch_path(
    inner: Arc<RegistryInner>,
    path: String,
    id: u64,
    mut subscription: Subscription,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = subscription.next() => event,
        };
        match event {
            Some(Ok(snapshot)) => inner.record_value(&path, id, snapshot),
            Some(Err(e)) => {
                inner.record_error(&path, id, e.into());
                break;
            }
            None => {
                inner.record_error(
                    &path,
                    id,
                    CoreError::SubscriptionClosed { path: path.clone() },
                );
                break;
            }
        }
    }
    trace!(path, id, "listener task finished");
}

impl RegistryInner {
    fn record_value(&self, path: &str, id: u64, snapshot: Snapshot) {
        // Hold the watcher entry so a concurrent remove cannot interleave.
        let Some(entry) = self.watchers.get(path) else {
            return;
        };
        if !entry.value().as_ref().is_some_and(|w| w.id == id) {
            return;
        }
        self.values.insert(path.to_owned(), snapshot.value);
        if let Some(priority) = snapshot.priority {
            self.priorities.insert(path.to_owned(), priority);
        } else {
            self.priorities.remove(path);
        }
        self.errors.remove(path);
        drop(entry);
        self.bump_version();
    }

    fn record_error(&self, path: &str, id: u64, err: CoreError) {
        let Some(mut entry) = self.watchers.get_mut(path) else {
            return;
        };
        if !entry.value().as_ref().is_some_and(|w| w.id == id) {
            return;
        }
        *entry = None;
        warn!(path, error = %err, "listener failed");
        self.values.remove(path);
        self.priorities.remove(path);
        self.errors.insert(path.to_owned(), err);
        drop(entry);
        self.bump_version();
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fireproof_api::MemoryDatabase;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> (Arc<MemoryDatabase>, ListenerRegistry) {
        let db = Arc::new(MemoryDatabase::from_json(
            "memory://listeners".parse().unwrap(),
            json!({
                "rooms": {"a": {"topic": "hi"}, "b": {"topic": "yo"}},
                "secret": 1,
            }),
        ));
        let registry = ListenerRegistry::new(db.reference("").unwrap());
        (db, registry)
    }

    /// Yield until `check` holds; subscription tasks run on the test runtime.
    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn add_subscribes_once_and_records_values() {
        let (db, registry) = setup();
        registry.add("rooms/a/topic").unwrap();
        registry.add("/rooms/a/topic/").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(db.listener_count(), 1);

        eventually(|| registry.value("rooms/a/topic").is_some()).await;
        assert_eq!(registry.value("rooms/a/topic"), Some(json!("hi")));

        db.reference("rooms/a/topic")
            .unwrap()
            .set(json!("bye"))
            .await
            .unwrap();
        eventually(|| registry.value("rooms/a/topic") == Some(json!("bye"))).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_share_one_subscription() {
        let (db, registry) = setup();
        let registry = Arc::new(registry);

        let adds: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.add("rooms/a/topic") })
            })
            .collect();
        for add in adds {
            add.await.unwrap().unwrap();
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(db.listener_count(), 1);

        registry.remove("rooms/a/topic");
        assert_eq!(db.listener_count(), 0);
    }

    #[tokio::test]
    async fn tick_sweeps_paths_not_requested_this_cycle() {
        let (db, registry) = setup();
        registry.add("rooms/a").unwrap();
        registry.add("rooms/b").unwrap();
        assert_eq!(registry.tick(), 0);

        // Next cycle only asks for `a`.
        registry.add("rooms/a").unwrap();
        assert_eq!(registry.tick(), 1);
        assert!(registry.is_listening("rooms/a"));
        assert!(!registry.is_listening("rooms/b"));
        assert_eq!(registry.value("rooms/b"), None);
        assert_eq!(db.listener_count(), 1);

        // A cycle that asks for nothing clears the rest.
        assert_eq!(registry.tick(), 1);
        assert!(registry.is_empty());
        assert_eq!(db.listener_count(), 0);
    }

    #[tokio::test]
    async fn revoked_listener_is_marked_dead_and_can_be_re_added() {
        let (db, registry) = setup();
        registry.add("secret").unwrap();
        eventually(|| registry.value("secret").is_some()).await;

        db.deny_read("secret").unwrap();
        eventually(|| registry.error("secret").is_some()).await;
        assert!(!registry.is_listening("secret"));
        assert_eq!(registry.value("secret"), None);
        assert!(matches!(
            registry.error("secret"),
            Some(CoreError::PermissionDenied { .. })
        ));

        // Still denied: the failure is recorded and returned.
        assert!(registry.add("secret").is_err());

        db.allow_read("secret").unwrap();
        registry.add("secret").unwrap();
        eventually(|| registry.value("secret") == Some(json!(1))).await;
        assert_eq!(registry.error("secret"), None);
    }

    #[tokio::test]
    async fn clear_and_drop_unregister_everything() {
        let (db, registry) = setup();
        registry.add("rooms/a").unwrap();
        registry.add("rooms/b").unwrap();
        registry.clear();
        assert_eq!(registry.len(), 0);
        assert_eq!(db.listener_count(), 0);

        registry.add("rooms/a").unwrap();
        drop(registry);
        assert_eq!(db.listener_count(), 0);
    }

    #[tokio::test]
    async fn changed_is_bumped_by_updates() {
        let (_db, registry) = setup();
        let mut changed = registry.changed();
        registry.add("rooms/b/topic").unwrap();
        changed.changed().await.unwrap();
        assert_eq!(registry.value("rooms/b/topic"), Some(json!("yo")));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let (_db, registry) = setup();
        assert!(matches!(
            registry.add("rooms/a.b"),
            Err(CoreError::InvalidPath { .. })
        ));
        assert!(registry.add("").is_err());
    }
}
