// ── Reactive projections ──
//
// Subscription type handed out by paginators and feeds. Each projection
// is a view over a `watch` channel that the owning engine republishes
// whenever its visible item list changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to an engine's visible items.
///
/// Provides both point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct Projection<T: Clone + Send + Sync + 'static> {
    current: Arc<Vec<T>>,
    receiver: watch::Receiver<Arc<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Projection<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<T>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Items captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Arc<Vec<T>> {
        &self.current
    }

    /// Latest items, which may be newer than `current()`.
    pub fn latest(&self) -> Arc<Vec<T>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next publication. `None` once the engine is dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<T>>> {
        self.receiver.changed().await.ok()?;
        let items = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&items);
        Some(items)
    }

    pub fn into_stream(self) -> ProjectionStream<T> {
        ProjectionStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding the item list on every publication,
/// starting with the current one.
pub struct ProjectionStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<Arc<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Stream for ProjectionStream<T> {
    type Item = Arc<Vec<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn changed_tracks_publications() {
        let (tx, rx) = watch::channel(Arc::new(vec![1]));
        let mut projection = Projection::new(rx);
        assert_eq!(**projection.current(), vec![1]);

        tx.send_replace(Arc::new(vec![1, 2]));
        assert_eq!(*projection.latest(), vec![1, 2]);
        assert_eq!(*projection.changed().await.unwrap(), vec![1, 2]);
        assert_eq!(**projection.current(), vec![1, 2]);

        drop(tx);
        assert!(projection.changed().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_current_first() {
        let (tx, rx) = watch::channel(Arc::new(vec!["a"]));
        let mut stream = Projection::new(rx).into_stream();
        assert_eq!(*stream.next().await.unwrap(), vec!["a"]);
        tx.send_replace(Arc::new(vec!["a", "b"]));
        assert_eq!(*stream.next().await.unwrap(), vec!["a", "b"]);
    }
}
