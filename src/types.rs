//! Core types for the store and its operation log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Full-state mapping from key to value.
///
/// BTree-backed, so iteration (and therefore batch application and
/// per-key notification order) is deterministic.
pub type StateMap = serde_json::Map<String, Value>;

/// Identifier of a logged operation.
///
/// Assigned at append time, strictly increasing by 1 from 1 within one log
/// generation. `commit` ends a generation and restarts numbering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub u64);

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({})", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Payload of a logged operation.
///
/// Serializes as `{"type": "set"|"update", "payload": ...}` so an exported
/// log keeps a self-describing wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum OpPayload {
    /// Replace one key's value.
    Set { key: String, value: Value },

    /// Overwrite every key in the batch, applied atomically.
    Update(StateMap),
}

/// One logged mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Position in the current log generation (assigned by the log).
    pub op_id: OpId,

    /// What was mutated.
    #[serde(flatten)]
    pub payload: OpPayload,

    /// When the entry was appended.
    pub timestamp: Timestamp,
}
