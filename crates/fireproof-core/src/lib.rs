//! Paging, feed aggregation and listener bookkeeping on top of `fireproof-api`.
//!
//! - **[`Controller`]**: Facade binding a backend to a root reference.
//!   [`attach()`](Controller::attach) resolves the root, authenticates if
//!   configured and starts watching auth state; every auth change clears
//!   the listener registry. Also exposes CRUD, transactions, increments and
//!   [`DeferredAction`]s bound to paths under the root.
//!
//! - **[`Paginator`]**: Bidirectional cursor pagination over one ordered
//!   sequence, driven by a [`QueryFn`]. Pages are cached and each key is
//!   shown on at most one page.
//!
//! - **[`Feed<T>`]**: Append-only merge of several ordered sources with
//!   identity-based deduplication and transform / filter / sort hooks.
//!
//! - **[`ListenerRegistry`]**: Keeps value listeners alive for the paths
//!   requested during a cycle and sweeps the rest on
//!   [`tick()`](ListenerRegistry::tick).
//!
//! - **[`QueryDescriptor`]**: Compact string form of a query, e.g.
//!   `users.orderByChild:"age".limitToFirst:10`.
//!
//! - **[`Projection<T>`]**: Subscription handle vended by paginators and
//!   feeds, exposing `current()` / `latest()` / `changed()`.

pub mod config;
pub mod controller;
pub mod cursor;
pub mod deferred;
pub mod descriptor;
pub mod error;
pub mod feed;
pub mod listener;
pub mod page;
pub mod path;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerConfig;
pub use controller::{ConnectionState, Controller};
pub use cursor::{QueryFn, ordered, query_fn};
pub use deferred::DeferredAction;
pub use descriptor::{QueryDescriptor, QueryOp};
pub use error::CoreError;
pub use feed::{Feed, FeedBuilder};
pub use listener::ListenerRegistry;
pub use page::Paginator;
pub use stream::{Projection, ProjectionStream};

// Store-level types callers need alongside the engines.
pub use fireproof_api::{AuthInfo, Backend, MemoryDatabase, OrderBy, Priority, Reference, Snapshot};
