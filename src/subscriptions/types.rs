//! Subscription types: callback ids, stop handles, and tap events.

use crate::types::{Op, StateMap};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Unique identifier for a registered callback or tap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Global subscriber: receives the full state after every committed mutation.
pub type SubscriberFn = Arc<dyn Fn(&StateMap) + Send + Sync>;

/// Per-key watcher: receives the raw value passed to `set`/`fire`.
pub type WatcherFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// Log watcher: receives each newly appended op.
pub type LogWatcherFn = Arc<dyn Fn(&Op) + Send + Sync>;

pub(crate) struct SubscriberEntry {
    pub id: SubscriptionId,
    pub cb: SubscriberFn,
}

pub(crate) struct WatcherEntry {
    pub id: SubscriptionId,
    pub cb: WatcherFn,
}

pub(crate) struct LogWatcherEntry {
    pub id: SubscriptionId,
    pub cb: LogWatcherFn,
}

/// Handle to a global subscription.
///
/// `stop` is idempotent; a second call is a silent no-op. Dropping the
/// handle without calling `stop` leaves the subscription registered.
pub struct SubscriptionHandle {
    pub(crate) entries: Weak<RwLock<Vec<SubscriberEntry>>>,
    pub(crate) id: SubscriptionId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the subscription. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.write().retain(|entry| entry.id != self.id);
        }
    }
}

/// Handle to a per-key watcher. `stop` is idempotent.
pub struct WatchHandle {
    pub(crate) watchers: Weak<RwLock<HashMap<String, Vec<WatcherEntry>>>>,
    pub(crate) key: String,
    pub(crate) id: SubscriptionId,
}

impl WatchHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the watcher. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(watchers) = self.watchers.upgrade() {
            let mut map = watchers.write();
            if let Some(list) = map.get_mut(&self.key) {
                list.retain(|entry| entry.id != self.id);
                if list.is_empty() {
                    map.remove(&self.key);
                }
            }
        }
    }
}

/// Handle to an op-log watcher. `stop` is idempotent.
pub struct LogWatchHandle {
    pub(crate) entries: Weak<RwLock<Vec<LogWatcherEntry>>>,
    pub(crate) id: SubscriptionId,
}

impl LogWatchHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the watcher. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.write().retain(|entry| entry.id != self.id);
        }
    }
}

/// Events delivered to channel taps.
///
/// Taps are an observation side channel: events are emitted after the
/// synchronous callback sequence of the triggering operation completes and
/// carry no ordering guarantee relative to other taps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// One key was replaced via `set`.
    Set { key: String, value: Value },

    /// A batch of keys was replaced via `update`.
    Update { entries: StateMap },

    /// The whole state was replaced via `force_set_state`.
    Replaced { state: StateMap },

    /// A synthetic watcher firing via `fire` (no state change).
    Fired { key: String, value: Value },

    /// The tap was dropped.
    Dropped { reason: DropReason },
}

/// Why a tap was dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver was dropped.
    Disconnected,
}

/// Bounded-channel consumer of store events.
///
/// Dropping the tap disconnects it; the hub prunes it on the next emit.
pub struct EventTap {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl EventTap {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
