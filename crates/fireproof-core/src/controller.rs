// ── Controller facade ──
//
// Owns the binding between a backend and everything built on it: the
// root reference, the listener registry and the authentication state.
// Paginators and feeds opened through the controller are rooted at its
// reference and sized from its configuration.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use fireproof_api::{
    AuthInfo, Backend, OrderBy, Priority, Reference, Snapshot, TransactionFn, TransactionOutcome,
};
use secrecy::SecretString;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::cursor;
use crate::deferred::DeferredAction;
use crate::descriptor::QueryDescriptor;
use crate::error::CoreError;
use crate::feed::{Feed, FeedBuilder};
use crate::listener::ListenerRegistry;
use crate::page::Paginator;
use crate::path;

// ── ConnectionState ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Detached,
    Attached,
}

// ── Controller ───────────────────────────────────────────────────

/// Entry point for consumers. Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    backend: Arc<dyn Backend>,
    root: ArcSwapOption<Reference>,
    listeners: ArcSwapOption<ListenerRegistry>,
    connection_state: watch::Sender<ConnectionState>,
    /// Last authentication state this controller acted on.
    auth: watch::Sender<Option<AuthInfo>>,
    cancel: CancellationToken,
    /// Child token for the current attachment; replaced on re-attach.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller over `backend`. Does NOT attach; call
    /// [`attach()`](Self::attach) to resolve the root and start listening
    /// for authentication changes.
    pub fn new(backend: Arc<dyn Backend>, config: ControllerConfig) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Detached);
        let (auth, _) = watch::channel(backend.auth_state().borrow().clone());
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                backend,
                root: ArcSwapOption::empty(),
                listeners: ArcSwapOption::empty(),
                connection_state,
                auth,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    // ── Attachment lifecycle ─────────────────────────────────────

    /// Resolve the configured root, authenticate if a token is configured,
    /// create a fresh listener registry and start the auth watcher.
    pub async fn attach(&self) -> Result<(), CoreError> {
        if self.is_attached() {
            self.detach().await;
        }

        let root = Reference::new(Arc::clone(&self.inner.backend), &self.inner.config.root)?;
        if let Some(token) = &self.inner.config.auth_token {
            self.authenticate(token.clone()).await?;
        }

        self.inner
            .listeners
            .store(Some(Arc::new(ListenerRegistry::new(root.clone()))));
        info!(root = %root, "attached");
        self.inner.root.store(Some(Arc::new(root)));

        let cancel = {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
            child.clone()
        };
        let ctrl = self.clone();
        let auth = self.inner.backend.auth_state();
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(auth_watch_task(ctrl, auth, cancel)));

        self.inner
            .connection_state
            .send_replace(ConnectionState::Attached);
        Ok(())
    }

    /// Stop background tasks, drop every listener and forget the root.
    pub async fn detach(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(registry) = self.inner.listeners.swap(None) {
            registry.clear();
        }
        self.inner.root.store(None);
        self.inner
            .connection_state
            .send_replace(ConnectionState::Detached);
        debug!("detached");
    }

    pub fn is_attached(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Attached
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// The attached root reference.
    pub fn root(&self) -> Result<Reference, CoreError> {
        self.inner
            .root
            .load_full()
            .map(|root| (*root).clone())
            .ok_or(CoreError::NotAttached)
    }

    /// Reference to `path` under the root. An empty path (or `/`) is the root.
    pub fn reference(&self, path: &str) -> Result<Reference, CoreError> {
        let root = self.root()?;
        if path.trim_matches('/').is_empty() {
            return Ok(root);
        }
        Ok(root.child(&path::validate(path)?)?)
    }

    // ── Authentication ───────────────────────────────────────────

    pub async fn authenticate(&self, token: SecretString) -> Result<AuthInfo, CoreError> {
        let info = self.inner.backend.authenticate(&token).await?;
        self.on_auth_change(Some(info.clone()));
        Ok(info)
    }

    pub fn unauthenticate(&self) {
        self.inner.backend.unauthenticate();
        self.on_auth_change(None);
    }

    pub fn auth(&self) -> Option<AuthInfo> {
        self.inner.auth.borrow().clone()
    }

    pub fn auth_changes(&self) -> watch::Receiver<Option<AuthInfo>> {
        self.inner.auth.subscribe()
    }

    /// Record a new auth state. Any change invalidates every listener,
    /// since the set of readable paths may have changed with it.
    fn on_auth_change(&self, auth: Option<AuthInfo>) {
        let uid = auth.as_ref().map(|a| a.uid.clone());
        let changed = self.inner.auth.send_if_modified(|current| {
            if *current == auth {
                false
            } else {
                *current = auth;
                true
            }
        });
        if !changed {
            return;
        }
        if let Some(registry) = self.inner.listeners.load_full() {
            registry.clear();
        }
        info!(uid = ?uid, "authentication changed, listeners cleared");
    }

    // ── Reads ────────────────────────────────────────────────────

    pub async fn get(&self, path: &str) -> Result<Snapshot, CoreError> {
        Ok(self.reference(path)?.get().await?)
    }

    /// Run a query descriptor (see [`QueryDescriptor`]) against the root.
    pub async fn query(&self, descriptor: &str) -> Result<Vec<Snapshot>, CoreError> {
        let query = QueryDescriptor::decode(descriptor)?.apply(&self.root()?)?;
        Ok(query.get().await?)
    }

    /// Open a paginator over the children of `path`, positioned on page one.
    pub async fn paginate(&self, path: &str, order: OrderBy) -> Result<Paginator, CoreError> {
        let pager = Paginator::new(cursor::ordered(order, self.inner.config.page_size));
        pager.connect(self.reference(path)?).await?;
        Ok(pager)
    }

    /// Build a snapshot feed over `paths`, connected to the root but not
    /// yet fetched.
    pub fn feed<S: AsRef<str>>(&self, paths: &[S], order: OrderBy) -> Result<Feed<Snapshot>, CoreError> {
        let feed = FeedBuilder::new(paths, cursor::ordered(order, self.inner.config.page_size)).build()?;
        feed.connect(self.root()?);
        Ok(feed)
    }

    // ── Writes ───────────────────────────────────────────────────

    pub async fn set(&self, path: &str, value: Value) -> Result<(), CoreError> {
        Ok(self.reference(path)?.set(value).await?)
    }

    pub async fn set_with_priority(
        &self,
        path: &str,
        value: Value,
        priority: Priority,
    ) -> Result<(), CoreError> {
        Ok(self
            .reference(path)?
            .set_with_priority(value, priority)
            .await?)
    }

    pub async fn set_priority(&self, path: &str, priority: Option<Priority>) -> Result<(), CoreError> {
        Ok(self.reference(path)?.set_priority(priority).await?)
    }

    pub async fn update(&self, path: &str, values: Map<String, Value>) -> Result<(), CoreError> {
        Ok(self.reference(path)?.update(values).await?)
    }

    pub async fn remove(&self, path: &str) -> Result<(), CoreError> {
        Ok(self.reference(path)?.remove().await?)
    }

    /// Append `value` under a new chronologically ordered key.
    pub async fn push(&self, path: &str, value: Value) -> Result<Reference, CoreError> {
        Ok(self.reference(path)?.push(value).await?)
    }

    /// Run a transaction; an update function returning `None` aborts it.
    pub async fn transaction(&self, path: &str, apply: TransactionFn) -> Result<Snapshot, CoreError> {
        match self.reference(path)?.transaction(apply).await? {
            TransactionOutcome::Committed(snapshot) => Ok(snapshot),
            TransactionOutcome::Aborted(_) => Err(CoreError::TransactionAborted {
                path: path.trim_matches('/').to_owned(),
            }),
        }
    }

    /// Atomically add `by` to the number at `path`. Missing or non-numeric
    /// values count as zero.
    pub async fn increment(&self, path: &str, by: i32) -> Result<Value, CoreError> {
        let snapshot = self
            .transaction(path, Box::new(move |current| Some(add(current, by))))
            .await?;
        Ok(snapshot.value)
    }

    // ── Deferred writes ──────────────────────────────────────────

    pub fn defer_set(&self, path: &str, value: Value) -> DeferredAction {
        let ctrl = self.clone();
        let path = path.to_owned();
        DeferredAction::new(format!("set /{path}"), move || async move {
            ctrl.set(&path, value).await
        })
    }

    pub fn defer_update(&self, path: &str, values: Map<String, Value>) -> DeferredAction {
        let ctrl = self.clone();
        let path = path.to_owned();
        DeferredAction::new(format!("update /{path}"), move || async move {
            ctrl.update(&path, values).await
        })
    }

    pub fn defer_remove(&self, path: &str) -> DeferredAction {
        let ctrl = self.clone();
        let path = path.to_owned();
        DeferredAction::new(format!("remove /{path}"), move || async move {
            ctrl.remove(&path).await
        })
    }

    pub fn defer_increment(&self, path: &str, by: i32) -> DeferredAction {
        let ctrl = self.clone();
        let path = path.to_owned();
        DeferredAction::new(format!("increment /{path} by {by}"), move || async move {
            ctrl.increment(&path, by).await.map(drop)
        })
    }

    // ── Live listeners ───────────────────────────────────────────

    pub fn listeners(&self) -> Option<Arc<ListenerRegistry>> {
        self.inner.listeners.load_full()
    }

    /// Keep a value listener on `path` alive for the current cycle.
    pub fn listen(&self, path: &str) -> Result<(), CoreError> {
        self.listeners().ok_or(CoreError::NotAttached)?.add(path)
    }

    pub fn value(&self, path: &str) -> Option<Value> {
        self.listeners()?.value(path)
    }

    pub fn priority(&self, path: &str) -> Option<Priority> {
        self.listeners()?.priority(path)
    }

    pub fn error(&self, path: &str) -> Option<CoreError> {
        self.listeners()?.error(path)
    }

    /// End the current listener cycle. Returns how many listeners were swept.
    pub fn tick(&self) -> usize {
        self.listeners().map_or(0, |registry| registry.tick())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("url", &self.inner.backend.url().as_str())
            .field("root", &self.inner.config.root)
            .field("state", &*self.inner.connection_state.borrow())
            .finish_non_exhaustive()
    }
}

fn add(current: Option<&Value>, by: i32) -> Value {
    match current {
        Some(Value::Number(n)) if n.is_i64() => {
            Value::from(n.as_i64().unwrap_or_default().saturating_add(i64::from(by)))
        }
        Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or_default() + f64::from(by)),
        _ => Value::from(by),
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Follow backend-side auth changes (token expiry, sign-out elsewhere).
async fn auth_watch_task(
    controller: Controller,
    mut auth: watch::Receiver<Option<AuthInfo>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = auth.borrow_and_update().clone();
                controller.on_auth_change(current);
            }
        }
    }
}
