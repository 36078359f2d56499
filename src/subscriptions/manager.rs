//! Notification hub: subscriber and watcher registries plus event taps.

use crate::types::StateMap;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{
    DropReason, EventTap, StoreEvent, SubscriberEntry, SubscriberFn, SubscriptionHandle,
    SubscriptionId, WatchHandle, WatcherEntry, WatcherFn,
};

/// Internal tap state.
struct TapEntry {
    id: SubscriptionId,
    sender: Sender<StoreEvent>,
}

impl TapEntry {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (tap will be dropped).
    fn try_send(&self, event: StoreEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Owns the store's notification channels and fires them in order.
///
/// Callback lists are copied before invocation, so a callback that
/// registers or stops subscriptions mid-fire cannot corrupt the
/// in-progress iteration. No lock is held while callbacks run, which keeps
/// synchronous re-entrancy (a callback mutating the same store) legal.
pub struct NotificationHub {
    /// Global subscribers, in registration order.
    subscribers: Arc<RwLock<Vec<SubscriberEntry>>>,
    /// Per-key watchers, each list in registration order.
    watchers: Arc<RwLock<HashMap<String, Vec<WatcherEntry>>>>,
    /// Channel taps.
    taps: RwLock<Vec<TapEntry>>,
    /// Counter for generating callback ids.
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            taps: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a global subscriber. Causes no immediate invocation.
    pub fn subscribe(&self, cb: SubscriberFn) -> SubscriptionHandle {
        let id = self.next_id();
        self.subscribers.write().push(SubscriberEntry { id, cb });
        SubscriptionHandle {
            entries: Arc::downgrade(&self.subscribers),
            id,
        }
    }

    /// Register a watcher for one key.
    pub fn watch(&self, key: &str, cb: WatcherFn) -> WatchHandle {
        let id = self.next_id();
        self.watchers
            .write()
            .entry(key.to_string())
            .or_default()
            .push(WatcherEntry { id, cb });
        WatchHandle {
            watchers: Arc::downgrade(&self.watchers),
            key: key.to_string(),
            id,
        }
    }

    /// Open a bounded channel tap.
    pub fn tap(&self, buffer_size: usize) -> EventTap {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size);
        self.taps.write().push(TapEntry { id, sender });
        EventTap { id, receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn watcher_count(&self, key: &str) -> usize {
        self.watchers.read().get(key).map_or(0, Vec::len)
    }

    pub fn tap_count(&self) -> usize {
        self.taps.read().len()
    }

    // --- Firing ---

    /// Invoke every global subscriber with the given full state, in
    /// registration order.
    pub fn notify_subscribers(&self, state: &StateMap) {
        let callbacks: Vec<SubscriberFn> = self
            .subscribers
            .read()
            .iter()
            .map(|entry| entry.cb.clone())
            .collect();
        for cb in callbacks {
            cb(state);
        }
    }

    /// Invoke every watcher registered for `key` with the raw value, in
    /// registration order.
    pub fn notify_watchers(&self, key: &str, value: &Value) {
        let callbacks: Vec<WatcherFn> = self
            .watchers
            .read()
            .get(key)
            .map(|list| list.iter().map(|entry| entry.cb.clone()).collect())
            .unwrap_or_default();
        for cb in callbacks {
            cb(value);
        }
    }

    /// Send an event to every tap. Taps that fail to receive are dropped
    /// with a best-effort `Dropped` notice.
    pub fn emit(&self, event: StoreEvent) {
        let mut to_remove = Vec::new();

        {
            let taps = self.taps.read();
            if taps.is_empty() {
                return;
            }
            for tap in taps.iter() {
                if !tap.try_send(event.clone()) {
                    to_remove.push(tap.id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut taps = self.taps.write();
            taps.retain(|tap| {
                if to_remove.contains(&tap.id) {
                    let _ = tap.sender.try_send(StoreEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                    false
                } else {
                    true
                }
            });
        }
    }

}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
