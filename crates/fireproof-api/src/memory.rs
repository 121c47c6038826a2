// ── In-memory backend ──
//
// A single JSON tree in the store's export format: a node with a priority
// is an object carrying a ".priority" key, and a primitive with a priority
// is wrapped as {".value": v, ".priority": p}. Reads strip that metadata.
//
// Every write re-evaluates each live listener and pushes a snapshot to the
// ones whose node actually changed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, ready};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use url::Url;

use crate::backend::{AuthInfo, Backend, ListenHandle, TransactionFn, TransactionOutcome};
use crate::error::Error;
use crate::query::QueryParams;
use crate::reference::{Reference, join_path, location, normalize_path};
use crate::snapshot::{Priority, Snapshot};

const PRIORITY_KEY: &str = ".priority";
const VALUE_KEY: &str = ".value";
const MAX_TRANSACTION_ATTEMPTS: u32 = 25;
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

struct LiveListener {
    path: String,
    tx: mpsc::UnboundedSender<Result<Snapshot, Error>>,
    /// Last node sent, to suppress no-op notifications.
    last: Value,
}

#[derive(Default)]
struct PushClock {
    last_ms: i64,
    suffix: [u8; 12],
}

/// In-process ordered store implementing [`Backend`].
pub struct MemoryDatabase {
    url: Url,
    tree: RwLock<Value>,
    denied: RwLock<Vec<String>>,
    listeners: Mutex<HashMap<u64, LiveListener>>,
    next_listener: AtomicU64,
    push_clock: Mutex<PushClock>,
    auth: watch::Sender<Option<AuthInfo>>,
}

impl MemoryDatabase {
    pub fn new(url: Url) -> Self {
        let (auth, _) = watch::channel(None);
        Self {
            url,
            tree: RwLock::new(Value::Null),
            denied: RwLock::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            push_clock: Mutex::new(PushClock::default()),
            auth,
        }
    }

    /// Build a store seeded with `data` (export format accepted).
    pub fn from_json(url: Url, data: Value) -> Self {
        let db = Self::new(url);
        *db.tree.write().expect("tree lock poisoned") = normalize(data);
        db
    }

    /// Reference to `path` in this store.
    pub fn reference(self: &Arc<Self>, path: &str) -> Result<Reference, Error> {
        let backend: Arc<dyn Backend> = Arc::clone(self) as Arc<dyn Backend>;
        Reference::new(backend, path)
    }

    /// The whole tree in export format.
    pub fn export(&self) -> Value {
        self.tree.read().expect("tree lock poisoned").clone()
    }

    /// Deny reads and listens at and below `path`. Live listeners in the
    /// denied subtree receive a permission error and are closed.
    pub fn deny_read(&self, path: &str) -> Result<(), Error> {
        let path = normalize_path(path)?;
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        listeners.retain(|id, listener| {
            if !is_within(&listener.path, &path) {
                return true;
            }
            debug!(listener = id, path = %listener.path, "closing listener after access revoked");
            let _ = listener.tx.send(Err(Error::PermissionDenied {
                path: listener.path.clone(),
            }));
            false
        });
        self.denied.write().expect("rules lock poisoned").push(path);
        Ok(())
    }

    /// Lift every read denial at or below `path`.
    pub fn allow_read(&self, path: &str) -> Result<(), Error> {
        let path = normalize_path(path)?;
        self.denied
            .write()
            .expect("rules lock poisoned")
            .retain(|rule| !is_within(rule, &path));
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        listeners.retain(|_, listener| !listener.tx.is_closed());
        listeners.len()
    }

    // ── Internals ────────────────────────────────────────────────

    fn check_read(&self, path: &str) -> Result<(), Error> {
        let denied = self.denied.read().expect("rules lock poisoned");
        if denied.iter().any(|rule| is_within(path, rule)) {
            return Err(Error::PermissionDenied {
                path: path.to_owned(),
            });
        }
        Ok(())
    }

    fn snapshot_of(&self, path: &str, node: &Value) -> Snapshot {
        Snapshot {
            key: path.rsplit('/').next().unwrap_or_default().to_owned(),
            value: export_value(node),
            priority: priority_of(node),
            reference: location(&self.url, path),
        }
    }

    fn snapshot_at(&self, tree: &Value, path: &str) -> Snapshot {
        let node = node_at(tree, path).unwrap_or(&Value::Null);
        self.snapshot_of(path, node)
    }

    fn write(&self, path: &str, node: Value) {
        {
            let mut tree = self.tree.write().expect("tree lock poisoned");
            write_node(&mut tree, &segments(path), node);
        }
        self.notify();
    }

    fn notify(&self) {
        let tree = self.tree.read().expect("tree lock poisoned");
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        listeners.retain(|_, listener| !listener.tx.is_closed());
        for listener in listeners.values_mut() {
            let node = node_at(&tree, &listener.path).unwrap_or(&Value::Null);
            if *node != listener.last {
                listener.last = node.clone();
                let _ = listener.tx.send(Ok(self.snapshot_of(&listener.path, node)));
            }
        }
    }

    fn run_transaction(&self, path: &str, mut apply: TransactionFn) -> Result<TransactionOutcome, Error> {
        self.check_read(path)?;
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let before = {
                let tree = self.tree.read().expect("tree lock poisoned");
                node_at(&tree, path).cloned().unwrap_or(Value::Null)
            };
            let current = export_value(&before);
            let input = (!current.is_null()).then_some(&current);

            let Some(next) = apply(input) else {
                return Ok(TransactionOutcome::Aborted(self.snapshot_of(path, &before)));
            };

            let committed = {
                let mut tree = self.tree.write().expect("tree lock poisoned");
                let now = node_at(&tree, path).cloned().unwrap_or(Value::Null);
                if now == before {
                    let node = make_node(normalize(next), priority_of(&before));
                    write_node(&mut tree, &segments(path), node);
                    Some(self.snapshot_at(&tree, path))
                } else {
                    None
                }
            };

            if let Some(snapshot) = committed {
                self.notify();
                return Ok(TransactionOutcome::Committed(snapshot));
            }
            debug!(path, attempt, "transaction input changed underneath, retrying");
        }
        Err(Error::TransactionContention {
            path: path.to_owned(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }
}

impl Backend for MemoryDatabase {
    fn url(&self) -> &Url {
        &self.url
    }

    fn read(&self, path: &str) -> BoxFuture<'static, Result<Snapshot, Error>> {
        let result = self.check_read(path).map(|()| {
            let tree = self.tree.read().expect("tree lock poisoned");
            self.snapshot_at(&tree, path)
        });
        ready(result).boxed()
    }

    fn fetch(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> BoxFuture<'static, Result<Vec<Snapshot>, Error>> {
        let result = params.validate().and_then(|()| self.check_read(path)).map(|()| {
            let tree = self.tree.read().expect("tree lock poisoned");
            let children = match node_at(&tree, path) {
                Some(Value::Object(map)) if !map.contains_key(VALUE_KEY) => map
                    .iter()
                    .filter(|(key, _)| !is_meta(key))
                    .map(|(key, child)| self.snapshot_of(&join_path(path, key), child))
                    .collect(),
                _ => Vec::new(),
            };
            params.apply(children)
        });
        ready(result).boxed()
    }

    fn listen(&self, path: &str) -> Result<ListenHandle, Error> {
        self.check_read(path)?;
        let (tx, events) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);

        let tree = self.tree.read().expect("tree lock poisoned");
        let node = node_at(&tree, path).cloned().unwrap_or(Value::Null);
        let _ = tx.send(Ok(self.snapshot_of(path, &node)));
        self.listeners.lock().expect("listener lock poisoned").insert(
            id,
            LiveListener {
                path: path.to_owned(),
                tx,
                last: node,
            },
        );
        debug!(listener = id, path, "listener registered");
        Ok(ListenHandle { id, events })
    }

    fn unlisten(&self, id: u64) {
        if self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .remove(&id)
            .is_some()
        {
            debug!(listener = id, "listener removed");
        }
    }

    fn set(
        &self,
        path: &str,
        value: Value,
        priority: Option<Priority>,
    ) -> BoxFuture<'static, Result<(), Error>> {
        self.write(path, make_node(normalize(value), priority));
        ready(Ok(())).boxed()
    }

    fn set_priority(
        &self,
        path: &str,
        priority: Option<Priority>,
    ) -> BoxFuture<'static, Result<(), Error>> {
        let current = {
            let tree = self.tree.read().expect("tree lock poisoned");
            node_at(&tree, path).cloned().unwrap_or(Value::Null)
        };
        if !current.is_null() {
            self.write(path, reprioritize(current, priority));
        }
        ready(Ok(())).boxed()
    }

    fn update(
        &self,
        path: &str,
        values: Map<String, Value>,
    ) -> BoxFuture<'static, Result<(), Error>> {
        let mut writes = Vec::with_capacity(values.len());
        for (relative, value) in values {
            match normalize_path(&relative) {
                Ok(child) if !child.is_empty() => writes.push((join_path(path, &child), value)),
                Ok(_) => {
                    return ready(Err(Error::InvalidPath {
                        path: relative,
                        reason: "update key is empty".into(),
                    }))
                    .boxed();
                }
                Err(e) => return ready(Err(e)).boxed(),
            }
        }
        {
            let mut tree = self.tree.write().expect("tree lock poisoned");
            for (target, value) in writes {
                write_node(&mut tree, &segments(&target), make_node(normalize(value), None));
            }
        }
        self.notify();
        ready(Ok(())).boxed()
    }

    fn transaction(
        &self,
        path: &str,
        apply: TransactionFn,
    ) -> BoxFuture<'static, Result<TransactionOutcome, Error>> {
        ready(self.run_transaction(path, apply)).boxed()
    }

    fn push_key(&self) -> String {
        let mut clock = self.push_clock.lock().expect("push clock lock poisoned");
        let now = Utc::now().timestamp_millis().max(clock.last_ms);
        if now == clock.last_ms {
            for digit in clock.suffix.iter_mut().rev() {
                if *digit < 63 {
                    *digit += 1;
                    break;
                }
                *digit = 0;
            }
        } else {
            clock.last_ms = now;
            clock.suffix = [0; 12];
        }

        let mut stamp = [0u8; 8];
        let mut remaining = now;
        for slot in stamp.iter_mut().rev() {
            *slot = push_char(remaining.rem_euclid(64));
            remaining = remaining.div_euclid(64);
        }
        let suffix = clock.suffix.map(|digit| push_char(i64::from(digit)));
        stamp.iter().chain(suffix.iter()).map(|&b| char::from(b)).collect()
    }

    fn authenticate(&self, token: &SecretString) -> BoxFuture<'static, Result<AuthInfo, Error>> {
        let uid = token.expose_secret().trim();
        if uid.is_empty() {
            return ready(Err(Error::Authentication {
                message: "empty token".into(),
            }))
            .boxed();
        }
        let info = AuthInfo {
            uid: uid.to_owned(),
            provider: "custom".into(),
            issued_at: Utc::now(),
        };
        self.auth.send_replace(Some(info.clone()));
        debug!(uid = %info.uid, "authenticated");
        ready(Ok(info)).boxed()
    }

    fn unauthenticate(&self) {
        if self.auth.send_replace(None).is_some() {
            debug!("unauthenticated");
        }
    }

    fn auth_state(&self) -> watch::Receiver<Option<AuthInfo>> {
        self.auth.subscribe()
    }
}

// ── Tree helpers ────────────────────────────────────────────────────

fn push_char(index: i64) -> u8 {
    usize::try_from(index)
        .ok()
        .and_then(|i| PUSH_CHARS.get(i).copied())
        .unwrap_or(b'-')
}

fn is_meta(key: &str) -> bool {
    key.starts_with('.')
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn node_at<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(tree, |node, seg| node.as_object()?.get(seg))
}

/// Write `node` at `segs`, creating parents as needed and pruning parents
/// left without children.
fn write_node(root: &mut Value, segs: &[&str], node: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *root = node;
        return;
    };
    let is_branch = root.as_object().is_some_and(|map| !map.contains_key(VALUE_KEY));
    if !is_branch {
        if node.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else {
        return;
    };
    let child_emptied = {
        let child = map.entry((*first).to_owned()).or_insert(Value::Null);
        write_node(child, rest, node);
        child.is_null()
    };
    if child_emptied {
        map.remove(*first);
    }
    if map.keys().all(|key| is_meta(key)) {
        *root = Value::Null;
    }
}

/// Convert arbitrary JSON into store form: arrays become index-keyed
/// objects, null children disappear, and `.value`/`.priority` pairs are
/// kept only when well-formed.
fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => normalize(Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        )),
        Value::Object(mut map) => {
            let priority = map.remove(PRIORITY_KEY).as_ref().and_then(Priority::from_json);
            if let Some(inner) = map.remove(VALUE_KEY) {
                return make_node(normalize(inner), priority);
            }
            let children: Map<String, Value> = map
                .into_iter()
                .filter(|(key, _)| !is_meta(key))
                .map(|(key, child)| (key, normalize(child)))
                .filter(|(_, child)| !child.is_null())
                .collect();
            if children.is_empty() {
                Value::Null
            } else {
                make_node(Value::Object(children), priority)
            }
        }
        other => other,
    }
}

fn make_node(value: Value, priority: Option<Priority>) -> Value {
    match (value, priority) {
        (Value::Null, _) => Value::Null,
        (value, None) => value,
        (Value::Object(mut map), Some(p)) => {
            map.insert(PRIORITY_KEY.into(), p.to_json());
            Value::Object(map)
        }
        (value, Some(p)) => {
            let mut wrapped = Map::new();
            wrapped.insert(VALUE_KEY.into(), value);
            wrapped.insert(PRIORITY_KEY.into(), p.to_json());
            Value::Object(wrapped)
        }
    }
}

fn reprioritize(node: Value, priority: Option<Priority>) -> Value {
    match node {
        Value::Object(mut map) => {
            if let Some(inner) = map.remove(VALUE_KEY) {
                return make_node(inner, priority);
            }
            map.remove(PRIORITY_KEY);
            make_node(Value::Object(map), priority)
        }
        other => make_node(other, priority),
    }
}

/// Strip store metadata from a node.
fn export_value(node: &Value) -> Value {
    match node {
        Value::Object(map) => match map.get(VALUE_KEY) {
            Some(inner) => inner.clone(),
            None => Value::Object(
                map.iter()
                    .filter(|(key, _)| !is_meta(key))
                    .map(|(key, child)| (key.clone(), export_value(child)))
                    .collect(),
            ),
        },
        other => other.clone(),
    }
}

fn priority_of(node: &Value) -> Option<Priority> {
    node.get(PRIORITY_KEY).and_then(Priority::from_json)
}
