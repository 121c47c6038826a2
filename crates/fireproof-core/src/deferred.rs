// ── Deferred write actions ──
//
// A write prepared now and executed later, typically bound to a UI event.
// Building one does nothing; `run()` performs the write exactly once.

use std::fmt;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::CoreError;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CoreError>> + Send>;

pub struct DeferredAction {
    label: String,
    action: Action,
}

impl DeferredAction {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Box::new(move || f().boxed()),
        }
    }

    /// Human-readable description, e.g. `set /users/alice`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn run(self) -> Result<(), CoreError> {
        debug!(action = %self.label, "running deferred action");
        (self.action)().await
    }
}

impl fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredAction").field(&self.label).finish()
    }
}
