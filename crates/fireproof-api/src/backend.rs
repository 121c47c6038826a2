// ── Backend capability ──
//
// The object-safe surface a concrete store implements. Every network-like
// operation returns a boxed future; live listeners hand back an unbounded
// channel receiver that yields one snapshot (or error) per change.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::error::Error;
use crate::query::QueryParams;
use crate::reference::Reference;
use crate::snapshot::{Priority, Snapshot};

/// Transaction update function. Receives the current value (`None` when
/// absent) and returns the value to commit, or `None` to abort.
pub type TransactionFn = Box<dyn FnMut(Option<&Value>) -> Option<Value> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    Committed(Snapshot),
    /// The update function declined to write. Carries the unchanged value.
    Aborted(Snapshot),
}

/// Identity of the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthInfo {
    pub uid: String,
    pub provider: String,
    pub issued_at: DateTime<Utc>,
}

/// Raw listener registration returned by [`Backend::listen`].
pub struct ListenHandle {
    pub id: u64,
    pub events: mpsc::UnboundedReceiver<Result<Snapshot, Error>>,
}

pub trait Backend: Send + Sync {
    /// Base URL; prefixes every reference string this backend produces.
    fn url(&self) -> &Url;

    fn read(&self, path: &str) -> BoxFuture<'static, Result<Snapshot, Error>>;

    fn fetch(&self, path: &str, params: &QueryParams)
    -> BoxFuture<'static, Result<Vec<Snapshot>, Error>>;

    /// Start a value listener. The current value is queued immediately.
    /// After an error is delivered the listener is closed by the backend.
    fn listen(&self, path: &str) -> Result<ListenHandle, Error>;

    /// Stop a listener. Unknown ids are ignored.
    fn unlisten(&self, id: u64);

    /// Replace the value (and priority) at `path`. `Null` removes it.
    fn set(
        &self,
        path: &str,
        value: Value,
        priority: Option<Priority>,
    ) -> BoxFuture<'static, Result<(), Error>>;

    fn set_priority(
        &self,
        path: &str,
        priority: Option<Priority>,
    ) -> BoxFuture<'static, Result<(), Error>>;

    fn update(&self, path: &str, values: Map<String, Value>)
    -> BoxFuture<'static, Result<(), Error>>;

    fn transaction(
        &self,
        path: &str,
        apply: TransactionFn,
    ) -> BoxFuture<'static, Result<TransactionOutcome, Error>>;

    /// A fresh child key that sorts after every key generated before it.
    fn push_key(&self) -> String;

    fn authenticate(&self, token: &SecretString) -> BoxFuture<'static, Result<AuthInfo, Error>>;

    fn unauthenticate(&self);

    fn auth_state(&self) -> watch::Receiver<Option<AuthInfo>>;
}

// ── Subscription ────────────────────────────────────────────────────

/// A live value listener. Dropping it unregisters from the backend.
pub struct Subscription {
    reference: Reference,
    id: u64,
    events: mpsc::UnboundedReceiver<Result<Snapshot, Error>>,
}

impl Subscription {
    pub(crate) fn new(reference: Reference, handle: ListenHandle) -> Self {
        Self {
            reference,
            id: handle.id,
            events: handle.events,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Wait for the next update. `None` once the backend closes the listener.
    pub async fn next(&mut self) -> Option<Result<Snapshot, Error>> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reference.backend().unlisten(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("reference", &self.reference.to_string())
            .finish_non_exhaustive()
    }
}
