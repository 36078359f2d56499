//! Subscriber, watcher, and event-tap plumbing.
//!
//! Three independent notification channels hang off a store:
//!
//! - **Subscribers** see the full state after every committed mutation.
//! - **Watchers** see the raw value for one key on `set`/`fire`.
//! - **Taps** consume [`StoreEvent`]s over a bounded channel, with slow
//!   consumers dropped rather than blocking the mutation path.

mod manager;
mod types;

pub use manager::NotificationHub;
pub use types::{
    DropReason, EventTap, LogWatchHandle, LogWatcherFn, StoreEvent, SubscriberFn,
    SubscriptionHandle, SubscriptionId, WatchHandle, WatcherFn,
};

pub(crate) use types::LogWatcherEntry;
