//! # Rewind
//!
//! An observable key-value state container with an optional append-only
//! operation log enabling point-in-time replay, sandbox editing, and
//! checkpoint commit.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: Deeply immutable, structurally shared state versions
//! - **Store**: Current snapshot plus synchronous subscriber and watcher channels
//! - **Oplog**: Monotonically numbered mutation log with pause / jump / resume / commit
//! - **Sandbox mode**: Rewind to a past op, edit freely, then discard or promote
//!
//! ## Example
//!
//! ```
//! use rewind::{Store, StoreConfig};
//! use serde_json::json;
//!
//! let store = Store::new(StoreConfig {
//!     enable_oplog: true,
//!     ..Default::default()
//! });
//!
//! store.set("abc", json!(10));
//! store.set("bbc", json!(20));
//! store.set("cnn", json!(60));
//!
//! let oplog = store.oplog().unwrap();
//!
//! // Rewind to just after the second mutation...
//! oplog.jump_to(2).unwrap();
//! assert_eq!(store.get("bbc"), Some(json!(20)));
//! assert_eq!(store.get("cnn"), None);
//!
//! // ...and abort the excursion.
//! oplog.resume();
//! assert_eq!(store.get("cnn"), Some(json!(60)));
//! ```
//!
//! Execution is synchronous: every notification fires within the call
//! stack of the triggering mutation, before it returns. All shared state
//! is lock-guarded internally and no lock is held while user callbacks
//! run, so callbacks may re-enter the store.

pub mod error;
pub mod oplog;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use oplog::{Oplog, OplogHistory};
pub use state::{apply_op, replay, Snapshot};
pub use store::{ApiFn, Store, StoreConfig};
pub use subscriptions::{
    DropReason, EventTap, LogWatchHandle, StoreEvent, SubscriptionHandle, SubscriptionId,
    WatchHandle,
};
pub use types::*;
