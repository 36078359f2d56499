//! Applying logged operations to snapshots.

use crate::state::Snapshot;
use crate::types::{Op, OpId, OpPayload};

/// Apply one operation payload to a snapshot, producing the next snapshot.
///
/// `Set` overwrites a single key; `Update` overwrites every key in its
/// batch. Either way the input snapshot is left untouched.
pub fn apply_op(state: &Snapshot, payload: &OpPayload) -> Snapshot {
    match payload {
        OpPayload::Set { key, value } => state.with(key, value.clone()),
        OpPayload::Update(entries) => state.with_entries(entries),
    }
}

/// Reconstruct the state at `up_to` by replaying `ops` onto `baseline`.
///
/// Entries are applied in ascending id order until the target id is passed
/// or the log is exhausted. An empty log, or a log whose first entry is
/// already past the target, yields the baseline itself.
pub fn replay(baseline: &Snapshot, ops: &[Op], up_to: OpId) -> Snapshot {
    let mut state = baseline.clone();
    for op in ops {
        if op.op_id > up_to {
            break;
        }
        state = apply_op(&state, &op.payload);
    }
    state
}
