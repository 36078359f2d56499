//! Append-only operation log with pause, replay, and checkpoint commit.
//!
//! An `Oplog` observes exactly one store, attached at construction.
//! While **live**, every mutation the store accepts is appended as an
//! immutable, monotonically numbered entry. The log can then:
//!
//! - `pause`: freeze recording for inspection, without rewriting;
//! - `jump_to`: freeze and rewind the store to the state just after a
//!   recorded op ("sandbox mode");
//! - `resume`: abort the excursion, restoring the pre-pause live state
//!   and discarding any sandbox mutations (they were never recorded);
//! - `commit`: promote the sandbox state to the new baseline, discarding
//!   all history and restarting op numbering at 1.
//!
//! The invariant underpinning all of this: baseline plus in-order replay
//! of every entry reconstructs the live state as it was before any pause
//! or jump began.

use crate::error::{Result, StoreError};
use crate::state::{replay, Snapshot};
use crate::store::StoreCore;
use crate::subscriptions::{LogWatchHandle, LogWatcherEntry, LogWatcherFn, SubscriptionId};
use crate::types::{Op, OpId, OpPayload, StateMap, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Log bookkeeping guarded by one lock: entries, numbering, and the
/// pause-state machine.
struct OplogInner {
    /// State the first entry applies on top of. Reset by `commit`.
    baseline: Snapshot,
    /// Recorded entries, ascending op id.
    ops: Vec<Op>,
    /// Last assigned op id (0 before the first entry of a generation).
    counter: u64,
    /// True between `pause`/`jump_to` and `resume`/`commit`.
    paused: bool,
    /// Live state captured when pausing began; restored by `resume`.
    pre_jump: Option<Snapshot>,
    /// Target of the last `jump_to`, if pausing came from a jump.
    current_op_id: Option<OpId>,
}

/// Append-only operation log driving time travel for one store.
pub struct Oplog {
    core: Arc<StoreCore>,
    inner: Mutex<OplogInner>,
    /// Log watchers, in registration order.
    watchers: Arc<RwLock<Vec<LogWatcherEntry>>>,
    /// Counter for generating watcher ids.
    next_watcher_id: AtomicU64,
}

impl Oplog {
    /// Attach a fresh log to a store core. The baseline is the store's
    /// state at this moment (defaults included).
    pub(crate) fn attach(core: Arc<StoreCore>) -> Self {
        let baseline = core.current();
        Self {
            core,
            inner: Mutex::new(OplogInner {
                baseline,
                ops: Vec::new(),
                counter: 0,
                paused: false,
                pre_jump: None,
                current_op_id: None,
            }),
            watchers: Arc::new(RwLock::new(Vec::new())),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    /// Rebuild a log from exported history. The counter resumes after the
    /// last restored entry.
    pub(crate) fn restore(core: Arc<StoreCore>, baseline: Snapshot, ops: Vec<Op>) -> Self {
        let counter = ops.last().map_or(0, |op| op.op_id.0);
        Self {
            core,
            inner: Mutex::new(OplogInner {
                baseline,
                ops,
                counter,
                paused: false,
                pre_jump: None,
                current_op_id: None,
            }),
            watchers: Arc::new(RwLock::new(Vec::new())),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    /// Record one accepted mutation. Invoked by the attached store after
    /// the mutation has committed and notified. Entirely a no-op while
    /// paused: sandbox mutations are never recorded.
    pub(crate) fn add_op(&self, payload: OpPayload) {
        let op = {
            let mut inner = self.inner.lock();
            if inner.paused {
                return;
            }
            inner.counter += 1;
            let op = Op {
                op_id: OpId(inner.counter),
                payload,
                timestamp: Timestamp::now(),
            };
            inner.ops.push(op.clone());
            op
        };
        debug!(op_id = %op.op_id, "recorded op");

        // Copy the watcher list before invoking, and hold no lock while
        // callbacks run; a watcher may inspect or drive this log.
        let callbacks: Vec<LogWatcherFn> = self
            .watchers
            .read()
            .iter()
            .map(|entry| entry.cb.clone())
            .collect();
        for cb in callbacks {
            cb(&op);
        }
    }

    // --- State machine ---

    /// Freeze recording and remember the current live state. A plain
    /// pause rewinds nothing. No-op if already paused.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            return;
        }
        inner.pre_jump = Some(self.core.current());
        inner.paused = true;
        inner.current_op_id = None;
        debug!("log paused");
    }

    /// Rewind the store to the state just after `op_id` and enter sandbox
    /// mode. No entries are discarded; the store merely shows a
    /// reconstructed past state until `resume` or `commit`.
    ///
    /// The pre-jump live state is captured before any rewrite, so a later
    /// `resume` aborts back to where the caller actually was, including when
    /// jumping repeatedly while already paused.
    ///
    /// Fails with [`StoreError::InvalidOpId`] for non-positive targets,
    /// leaving log and store untouched. A target below the first recorded
    /// entry yields exactly the baseline.
    pub fn jump_to(&self, op_id: i64) -> Result<()> {
        if op_id < 1 {
            return Err(StoreError::InvalidOpId(op_id));
        }
        let target = OpId(op_id as u64);

        let reconstructed = {
            let mut inner = self.inner.lock();
            if !inner.paused {
                inner.pre_jump = Some(self.core.current());
                inner.paused = true;
            }
            inner.current_op_id = Some(target);
            replay(&inner.baseline, &inner.ops, target)
        };
        debug!(op_id = %target, "jumped to recorded op");

        self.core.force_set_state(reconstructed);
        Ok(())
    }

    /// Leave sandbox mode, pushing the remembered pre-pause state back
    /// into the store. Mutations made while paused are discarded; they
    /// were never recorded. No-op while live.
    pub fn resume(&self) {
        let restored = {
            let mut inner = self.inner.lock();
            if !inner.paused {
                return;
            }
            inner.paused = false;
            inner.current_op_id = None;
            match inner.pre_jump.take() {
                Some(snapshot) => snapshot,
                None => return,
            }
        };
        debug!("log resumed");

        self.core.force_set_state(restored);
    }

    /// Promote the current sandbox state to the new baseline: all history
    /// is discarded, numbering restarts at 1, and the store goes live on
    /// the promoted state. Fails with [`StoreError::NotPaused`] while
    /// live, changing nothing.
    pub fn commit(&self) -> Result<()> {
        let promoted = {
            let mut inner = self.inner.lock();
            if !inner.paused {
                return Err(StoreError::NotPaused);
            }
            let promoted = self.core.current();
            inner.baseline = promoted.clone();
            inner.ops.clear();
            inner.counter = 0;
            inner.paused = false;
            inner.pre_jump = None;
            inner.current_op_id = None;
            promoted
        };
        debug!("log committed; history discarded");

        // Same push as resume, with the promoted state: a no-op state
        // change that restores live semantics and notifies observers.
        self.core.force_set_state(promoted);
        Ok(())
    }

    // --- Inspection ---

    /// Ordered copy of the recorded entries.
    pub fn get_all_ops(&self) -> Vec<Op> {
        self.inner.lock().ops.clone()
    }

    pub fn op_count(&self) -> usize {
        self.inner.lock().ops.len()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Target of the last `jump_to`, while paused by one.
    pub fn current_op_id(&self) -> Option<OpId> {
        self.inner.lock().current_op_id
    }

    /// The snapshot the log's entries replay on top of.
    pub fn baseline(&self) -> Snapshot {
        self.inner.lock().baseline.clone()
    }

    /// Register `cb` to be called with each newly appended entry. The
    /// handle's `stop` is idempotent.
    pub fn watch<F>(&self, cb: F) -> LogWatchHandle
    where
        F: Fn(&Op) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_watcher_id.fetch_add(1, Ordering::SeqCst));
        self.watchers.write().push(LogWatcherEntry {
            id,
            cb: Arc::new(cb),
        });
        LogWatchHandle {
            entries: Arc::downgrade(&self.watchers),
            id,
        }
    }

    // --- History export ---

    /// The serialization unit for external persistence: baseline plus
    /// entries, sufficient to reconstruct any recorded state by replay.
    pub fn history(&self) -> OplogHistory {
        let inner = self.inner.lock();
        OplogHistory {
            baseline: inner.baseline.to_map(),
            ops: inner.ops.clone(),
        }
    }

    /// Export the history as MessagePack bytes.
    pub fn export_history(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&self.history())?)
    }

    /// Decode history bytes produced by [`export_history`](Self::export_history).
    pub fn import_history(bytes: &[u8]) -> Result<OplogHistory> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Baseline snapshot plus op sequence: everything needed to rebuild a
/// store and its log, or any state in between, via replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OplogHistory {
    pub baseline: StateMap,
    pub ops: Vec<Op>,
}
