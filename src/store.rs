//! Main Store struct: current state, notification dispatch, extension APIs.

use crate::error::{Result, StoreError};
use crate::oplog::{Oplog, OplogHistory};
use crate::state::{replay, Snapshot};
use crate::subscriptions::{
    EventTap, NotificationHub, StoreEvent, SubscriptionHandle, WatchHandle,
};
use crate::types::{OpId, OpPayload, StateMap};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Store configuration.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// Initial key/value defaults. Copied at construction; later mutation
    /// of the caller's map cannot affect the store.
    pub defaults: StateMap,

    /// Attach an operation log for replay and time travel.
    pub enable_oplog: bool,
}

/// Extension function registered under a name via [`Store::register_api`].
pub type ApiFn = Arc<dyn Fn(&Store, &[Value]) -> Value + Send + Sync>;

/// Built-in method names an extension may not shadow.
const RESERVED_NAMES: &[&str] = &[
    "new",
    "with_defaults",
    "from_history",
    "get",
    "get_all",
    "snapshot",
    "set",
    "update",
    "subscribe",
    "watch",
    "watch_for",
    "fire",
    "force_set_state",
    "register_api",
    "invoke",
    "oplog",
    "events",
];

/// Shared mutable heart of a store: the current snapshot plus the
/// notification hub. The op log holds this too, so its replay pushes can
/// drive the same notification sequence without a reference cycle.
pub(crate) struct StoreCore {
    snapshot: RwLock<Snapshot>,
    hub: NotificationHub,
}

impl StoreCore {
    /// O(1) handle to the current snapshot.
    pub(crate) fn current(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    /// Defensive full copy of the current state.
    pub(crate) fn state_map(&self) -> StateMap {
        self.snapshot.read().to_map()
    }

    /// Replace the whole state by reference adoption and run the
    /// bulk-replace notification sequence: every subscriber once with the
    /// new full state, then the watcher list for every key present in the
    /// new snapshot (removed keys fire nothing), unconditionally.
    pub(crate) fn force_set_state(&self, next: Snapshot) {
        *self.snapshot.write() = next.clone();

        let state = next.to_map();
        self.hub.notify_subscribers(&state);
        for (key, value) in next.iter() {
            self.hub.notify_watchers(key, value);
        }
        self.hub.emit(StoreEvent::Replaced { state });
    }
}

/// A process-local, observable key-value state container.
///
/// Holds exactly one current [`Snapshot`] and dispatches two independent
/// synchronous notification channels: global subscribers (full state after
/// every committed mutation) and per-key watchers (raw values). With
/// `enable_oplog`, every accepted mutation is also recorded in an attached
/// [`Oplog`] for point-in-time replay.
///
/// All notification fires within the call stack of the triggering
/// mutation, in registration order. Callbacks may re-enter the store;
/// unbounded recursion is the caller's responsibility.
pub struct Store {
    core: Arc<StoreCore>,
    oplog: Option<Arc<Oplog>>,
    api: RwLock<HashMap<String, ApiFn>>,
}

impl Store {
    /// Create a store from a configuration.
    pub fn new(config: StoreConfig) -> Self {
        let core = Arc::new(StoreCore {
            snapshot: RwLock::new(Snapshot::from_map(&config.defaults)),
            hub: NotificationHub::new(),
        });

        // The log's baseline is the post-defaults state.
        let oplog = config
            .enable_oplog
            .then(|| Arc::new(Oplog::attach(Arc::clone(&core))));

        Self {
            core,
            oplog,
            api: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store with initial defaults and no op log.
    pub fn with_defaults(defaults: StateMap) -> Self {
        Self::new(StoreConfig {
            defaults,
            ..Default::default()
        })
    }

    /// Rebuild a store (with op log) from an exported history: the log's
    /// baseline and entries are restored verbatim and the live state is
    /// reconstructed by replaying every entry onto the baseline.
    pub fn from_history(history: OplogHistory) -> Self {
        let baseline = Snapshot::from_map(&history.baseline);
        let live = replay(
            &baseline,
            &history.ops,
            history.ops.last().map_or(OpId(0), |op| op.op_id),
        );

        let core = Arc::new(StoreCore {
            snapshot: RwLock::new(live),
            hub: NotificationHub::new(),
        });
        let oplog = Arc::new(Oplog::restore(Arc::clone(&core), baseline, history.ops));

        Self {
            core,
            oplog: Some(oplog),
            api: RwLock::new(HashMap::new()),
        }
    }

    // --- Reads ---

    /// Defensive copy of the value at `key`, or `None` if unset.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.core.snapshot.read().get(key).cloned()
    }

    /// Defensive full copy of the current state.
    pub fn get_all(&self) -> StateMap {
        self.core.state_map()
    }

    /// O(1) handle to the current immutable snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.core.current()
    }

    // --- Mutations ---

    /// Replace `key`'s value, producing a new snapshot; prior snapshots
    /// remain valid. Fires `key`'s watchers with the raw value, then every
    /// subscriber with the fresh full state, then records a `Set` entry if
    /// a live op log is attached.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        trace!(key = %key, "set");

        {
            let mut snapshot = self.core.snapshot.write();
            let next = snapshot.with(&key, value.clone());
            *snapshot = next;
        }

        self.core.hub.notify_watchers(&key, &value);
        self.core.hub.notify_subscribers(&self.core.state_map());

        if let Some(oplog) = &self.oplog {
            oplog.add_op(OpPayload::Set {
                key: key.clone(),
                value: value.clone(),
            });
        }

        self.core.hub.emit(StoreEvent::Set { key, value });
    }

    /// Batch mutation. `f` receives a defensive copy of the current state
    /// and returns the mapping of keys to apply, or `None` to abort.
    ///
    /// Each returned key is applied and its watchers fired in turn (key
    /// order); subscribers fire exactly once afterwards with the final
    /// state. A live op log records one `Update` entry carrying the full
    /// returned mapping.
    ///
    /// Returns [`StoreError::InvalidUpdateResult`] without mutating when
    /// `f` returns `None`.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(StateMap) -> Option<StateMap>,
    {
        let changes = f(self.core.state_map()).ok_or(StoreError::InvalidUpdateResult)?;
        trace!(keys = changes.len(), "update");

        for (key, value) in &changes {
            {
                let mut snapshot = self.core.snapshot.write();
                let next = snapshot.with(key, value.clone());
                *snapshot = next;
            }
            self.core.hub.notify_watchers(key, value);
        }

        self.core.hub.notify_subscribers(&self.core.state_map());

        if let Some(oplog) = &self.oplog {
            oplog.add_op(OpPayload::Update(changes.clone()));
        }

        self.core.hub.emit(StoreEvent::Update { entries: changes });
        Ok(())
    }

    /// Replace the entire state atomically by reference adoption (not a
    /// merge). Fires every subscriber once with the new full state, then
    /// the watchers of every key present in `snapshot` with its new value,
    /// even when unchanged. Keys absent from `snapshot` fire nothing.
    ///
    /// Never recorded in the op log; this is the path the log itself uses
    /// to drive time travel, and doubles as a bulk-replace API.
    pub fn force_set_state(&self, snapshot: Snapshot) {
        debug!(keys = snapshot.len(), "force_set_state");
        self.core.force_set_state(snapshot);
    }

    // --- Notification channels ---

    /// Register `cb` to run after every committed mutation (`set`,
    /// `update`, `force_set_state`) with the full current state.
    /// Registration causes no immediate invocation. The handle's `stop`
    /// is idempotent.
    pub fn subscribe<F>(&self, cb: F) -> SubscriptionHandle
    where
        F: Fn(&StateMap) + Send + Sync + 'static,
    {
        self.core.hub.subscribe(Arc::new(cb))
    }

    /// Register `cb` to receive the raw value of every `set(key, ..)` or
    /// `fire(key, ..)` for this exact key. Independent of `subscribe`.
    pub fn watch<F>(&self, key: impl Into<String>, cb: F) -> WatchHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.core.hub.watch(&key.into(), Arc::new(cb))
    }

    /// As [`watch`](Self::watch), but `cb` only runs when the observed
    /// value is strictly equal to `expected`.
    ///
    /// Strict means scalar identity: `Null`, `Bool`, `Number`, and
    /// `String` expected values compare by value; composite (array or
    /// object) expected values never match, since two independently built
    /// composites share no identity. Deliberately not deep equality.
    pub fn watch_for<F>(&self, key: impl Into<String>, expected: Value, cb: F) -> WatchHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.watch(key, move |value: &Value| {
            if strictly_equal(value, &expected) {
                cb(value);
            }
        })
    }

    /// Synchronously invoke every watcher for `key` with `value`. Pure
    /// synthetic-event injection: no state change, no subscriber
    /// notification, no log entry.
    pub fn fire(&self, key: &str, value: &Value) {
        self.core.hub.notify_watchers(key, value);
        self.core.hub.emit(StoreEvent::Fired {
            key: key.to_string(),
            value: value.clone(),
        });
    }

    /// Open a bounded channel tap over store events. A tap that stops
    /// consuming is dropped rather than blocking mutations.
    pub fn events(&self, buffer_size: usize) -> EventTap {
        self.core.hub.tap(buffer_size)
    }

    // --- Extension APIs ---

    /// Attach a callable under `name`. Fails with
    /// [`StoreError::DuplicateApi`] if `name` is a built-in method or
    /// already registered; the registry is unchanged on failure.
    pub fn register_api<F>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&Store, &[Value]) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(StoreError::DuplicateApi(name));
        }

        let mut apis = self.api.write();
        if apis.contains_key(&name) {
            return Err(StoreError::DuplicateApi(name));
        }
        apis.insert(name, Arc::new(f));
        Ok(())
    }

    /// Call a registered extension with `args`. The extension receives the
    /// store handle and may call back into it.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let f = self
            .api
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownApi(name.to_string()))?;
        // Registry lock is released before the call so the extension can
        // register further APIs or invoke others.
        Ok(f(self, args))
    }

    /// The attached op log, if the store was built with one.
    pub fn oplog(&self) -> Option<&Oplog> {
        self.oplog.as_deref()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

/// Scalar-only strict equality for `watch_for`.
fn strictly_equal(observed: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(_) | Value::Object(_) => false,
        _ => observed == expected,
    }
}
