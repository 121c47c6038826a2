//! Query and subscription capability over an ordered, hierarchical realtime store.
//!
//! Everything above this crate talks to the store through three types:
//!
//! - **[`Reference`]**: Immutable handle to one location. Derives children
//!   and [`Query`] values but is never mutated in place.
//!
//! - **[`Query`]**: Ordering (`order_by_key|priority|value|child`), range
//!   (`start_at` / `end_at` / `equal_to`) and limit (`limit_to_first` /
//!   `limit_to_last`) parameters bound to a reference. [`Query::get()`]
//!   fetches the matching children as an ordered [`Snapshot`] sequence.
//!
//! - **[`Backend`]**: Object-safe trait a concrete store implements.
//!   [`MemoryDatabase`] is the in-process implementation used by tests and
//!   the CLI's fixture mode.

pub mod backend;
pub mod error;
pub mod memory;
pub mod order;
pub mod query;
pub mod reference;
pub mod snapshot;

pub use backend::{AuthInfo, Backend, ListenHandle, Subscription, TransactionFn, TransactionOutcome};
pub use error::Error;
pub use memory::MemoryDatabase;
pub use query::{Bound, Limit, OrderBy, Query, QueryParams};
pub use reference::{Reference, normalize_path};
pub use snapshot::{Priority, Snapshot};
