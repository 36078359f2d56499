//! Operation log tests: numbering, pause/jump/resume/commit, replay laws.

use parking_lot::Mutex;
use proptest::prelude::*;
use rewind::{Op, OpId, OpPayload, Oplog, Store, StoreConfig, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;

fn map(value: Value) -> rewind::StateMap {
    value.as_object().unwrap().clone()
}

fn logged_store(defaults: Value) -> Store {
    Store::new(StoreConfig {
        defaults: map(defaults),
        enable_oplog: true,
    })
}

/// Strip timestamps so fixtures can compare ids and payloads.
fn ids_and_payloads(ops: Vec<Op>) -> Vec<(u64, OpPayload)> {
    ops.into_iter().map(|op| (op.op_id.0, op.payload)).collect()
}

// --- Recording ---

#[test]
fn test_records_all_ops() {
    let store = logged_store(json!({"kkr": 10}));

    store.set("abc", json!(10));
    store
        .update(|_| Some(map(json!({"abc": 20, "bbc": 50}))))
        .unwrap();

    let ops = ids_and_payloads(store.oplog().unwrap().get_all_ops());
    assert_eq!(
        ops,
        vec![
            (
                1,
                OpPayload::Set {
                    key: "abc".into(),
                    value: json!(10),
                }
            ),
            (2, OpPayload::Update(map(json!({"abc": 20, "bbc": 50})))),
        ]
    );
}

#[test]
fn test_op_numbering_is_dense_from_one() {
    let store = logged_store(json!({}));

    for i in 0..5 {
        store.set("k", json!(i));
    }

    let ids: Vec<u64> = store
        .oplog()
        .unwrap()
        .get_all_ops()
        .iter()
        .map(|op| op.op_id.0)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_no_ops_recorded_while_paused() {
    let store = logged_store(json!({"kkr": 10}));
    let oplog = store.oplog().unwrap();

    oplog.pause();
    store.set("abc", json!(10));

    assert!(oplog.get_all_ops().is_empty());
}

#[test]
fn test_recording_restarts_after_resume() {
    let store = logged_store(json!({"kkr": 10}));
    let oplog = store.oplog().unwrap();

    oplog.pause();
    store.set("abc", json!(10));

    oplog.resume();
    store.set("ccy", json!(20));

    let ops = ids_and_payloads(oplog.get_all_ops());
    assert_eq!(
        ops,
        vec![(
            1,
            OpPayload::Set {
                key: "ccy".into(),
                value: json!(20),
            }
        )]
    );
}

// --- Log Watchers ---

#[test]
fn test_log_watcher_sees_appended_entries() {
    let store = logged_store(json!({"kkr": 10}));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_in = Arc::clone(&seen);
    store
        .oplog()
        .unwrap()
        .watch(move |op| seen_in.lock().push(op.clone()));

    store.set("aac", json!(20));

    let ops = ids_and_payloads(seen.lock().clone());
    assert_eq!(
        ops,
        vec![(
            1,
            OpPayload::Set {
                key: "aac".into(),
                value: json!(20),
            }
        )]
    );
}

#[test]
fn test_log_watcher_stop_is_idempotent() {
    let store = logged_store(json!({}));
    let calls = Arc::new(Mutex::new(0u32));

    let calls_in = Arc::clone(&calls);
    let handle = store.oplog().unwrap().watch(move |_| *calls_in.lock() += 1);

    handle.stop();
    handle.stop();
    store.set("aac", json!(20));

    assert_eq!(*calls.lock(), 0);
}

// --- JumpTo ---

#[test]
fn test_jump_to_replays_set_prefix() {
    let store = logged_store(json!({"kkr": 10}));

    store.set("abc", json!(10));
    store.set("bbc", json!(20));
    store.set("cnn", json!(60));

    store.oplog().unwrap().jump_to(2).unwrap();

    assert_eq!(
        store.get_all(),
        map(json!({"kkr": 10, "abc": 10, "bbc": 20}))
    );
}

#[test]
fn test_jump_to_replays_update_batches() {
    let store = logged_store(json!({"kkr": 10}));

    store
        .update(|_| Some(map(json!({"kkr": 50, "gyc": 70}))))
        .unwrap();
    store.set("bbc", json!(20));
    store.set("cnn", json!(60));

    store.oplog().unwrap().jump_to(2).unwrap();

    assert_eq!(
        store.get_all(),
        map(json!({"kkr": 50, "gyc": 70, "bbc": 20}))
    );
}

#[test]
fn test_jump_on_empty_log_yields_baseline() {
    let store = logged_store(json!({"kkr": 10}));

    store.oplog().unwrap().jump_to(5).unwrap();

    assert_eq!(store.get_all(), map(json!({"kkr": 10})));
}

#[test]
fn test_jump_pauses_and_keeps_entries() {
    let store = logged_store(json!({}));
    store.set("abc", json!(10));
    store.set("bbc", json!(20));

    let oplog = store.oplog().unwrap();
    oplog.jump_to(1).unwrap();

    assert!(oplog.is_paused());
    assert_eq!(oplog.current_op_id(), Some(OpId(1)));
    // No entries are discarded by a jump.
    assert_eq!(oplog.op_count(), 2);

    // Sandbox mutations are not recorded.
    store.set("scratch", json!(true));
    assert_eq!(oplog.op_count(), 2);
}

#[test]
fn test_jump_rejects_non_positive_targets() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));
    let oplog = store.oplog().unwrap();

    for bad in [0, -3] {
        let result = oplog.jump_to(bad);
        assert!(matches!(result, Err(StoreError::InvalidOpId(id)) if id == bad));
    }

    // Rejected before any side effect: still live, state untouched.
    assert!(!oplog.is_paused());
    assert_eq!(store.get_all(), map(json!({"kkr": 10, "abc": 10})));
}

#[test]
fn test_jump_notifies_like_bulk_replace() {
    let store = logged_store(json!({}));
    store.set("abc", json!(10));
    store.set("abc", json!(20));

    let subscriber_calls = Arc::new(Mutex::new(0u32));
    let abc_values = Arc::new(Mutex::new(Vec::new()));

    let calls = Arc::clone(&subscriber_calls);
    store.subscribe(move |_| *calls.lock() += 1);
    let abc = Arc::clone(&abc_values);
    store.watch("abc", move |value| abc.lock().push(value.clone()));

    store.oplog().unwrap().jump_to(1).unwrap();

    assert_eq!(*subscriber_calls.lock(), 1);
    assert_eq!(*abc_values.lock(), vec![json!(10)]);
}

// --- Resume ---

#[test]
fn test_resume_restores_pre_jump_live_state() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));
    store.set("bbc", json!(20));
    let live = store.get_all();

    let oplog = store.oplog().unwrap();
    oplog.jump_to(1).unwrap();
    assert_ne!(store.get_all(), live);

    // Sandbox edits are discarded on resume; they were never logged.
    store.set("scratch", json!(true));
    oplog.resume();

    assert_eq!(store.get_all(), live);
    assert!(!oplog.is_paused());
    assert_eq!(oplog.current_op_id(), None);
}

#[test]
fn test_resume_after_plain_pause_discards_paused_mutations() {
    let store = logged_store(json!({"kkr": 10}));
    let oplog = store.oplog().unwrap();

    oplog.pause();
    store.set("abc", json!(10));
    oplog.resume();

    assert_eq!(store.get_all(), map(json!({"kkr": 10})));
}

#[test]
fn test_resume_while_live_is_a_noop() {
    let store = logged_store(json!({"kkr": 10}));
    let oplog = store.oplog().unwrap();

    oplog.resume();

    assert_eq!(store.get_all(), map(json!({"kkr": 10})));
    assert!(!oplog.is_paused());
}

#[test]
fn test_repeated_jumps_keep_original_pre_jump_state() {
    let store = logged_store(json!({}));
    store.set("abc", json!(10));
    store.set("bbc", json!(20));
    store.set("cnn", json!(60));
    let live = store.get_all();

    let oplog = store.oplog().unwrap();
    oplog.jump_to(1).unwrap();
    oplog.jump_to(2).unwrap();
    assert_eq!(oplog.current_op_id(), Some(OpId(2)));

    // Resume aborts to the state before the first jump, not the second.
    oplog.resume();
    assert_eq!(store.get_all(), live);
}

// --- Commit ---

#[test]
fn test_commit_requires_paused_log() {
    let store = logged_store(json!({}));
    store.set("abc", json!(10));

    let result = store.oplog().unwrap().commit();
    assert!(matches!(result, Err(StoreError::NotPaused)));

    // Nothing changed: still live, history intact.
    assert_eq!(store.oplog().unwrap().op_count(), 1);
    assert_eq!(store.get("abc"), Some(json!(10)));
}

#[test]
fn test_commit_discards_history_and_restarts_numbering() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));
    store.set("bbc", json!(20));
    store.set("cnn", json!(60));

    let oplog = store.oplog().unwrap();
    oplog.jump_to(2).unwrap();
    oplog.commit().unwrap();

    assert!(oplog.get_all_ops().is_empty());
    assert!(!oplog.is_paused());
    assert_eq!(store.get_all(), map(json!({"kkr": 10, "abc": 10, "bbc": 20})));

    store.set("fresh", json!(1));
    let ops = ids_and_payloads(oplog.get_all_ops());
    assert_eq!(
        ops,
        vec![(
            1,
            OpPayload::Set {
                key: "fresh".into(),
                value: json!(1),
            }
        )]
    );
}

#[test]
fn test_commit_promotes_sandbox_edits() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));

    let oplog = store.oplog().unwrap();
    oplog.jump_to(1).unwrap();
    store.set("experiment", json!("keep me"));
    oplog.commit().unwrap();

    // The sandbox state is the new permanent baseline.
    assert_eq!(
        store.get_all(),
        map(json!({"kkr": 10, "abc": 10, "experiment": "keep me"}))
    );
    assert_eq!(
        oplog.baseline().to_map(),
        map(json!({"kkr": 10, "abc": 10, "experiment": "keep me"}))
    );

    // Replay after commit runs against the promoted baseline.
    store.set("later", json!(2));
    oplog.jump_to(1).unwrap();
    assert_eq!(
        store.get_all(),
        map(json!({"kkr": 10, "abc": 10, "experiment": "keep me", "later": 2}))
    );
}

#[test]
fn test_commit_after_plain_pause_keeps_live_state() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));

    let oplog = store.oplog().unwrap();
    oplog.pause();
    oplog.commit().unwrap();

    assert_eq!(store.get_all(), map(json!({"kkr": 10, "abc": 10})));
    assert!(oplog.get_all_ops().is_empty());
    assert!(!oplog.is_paused());
}

// --- History Export / Import ---

#[test]
fn test_history_roundtrip_rebuilds_store() {
    let store = logged_store(json!({"kkr": 10}));
    store.set("abc", json!(10));
    store
        .update(|_| Some(map(json!({"abc": 20, "bbc": 50}))))
        .unwrap();

    let bytes = store.oplog().unwrap().export_history().unwrap();
    let history = Oplog::import_history(&bytes).unwrap();
    let rebuilt = Store::from_history(history);

    assert_eq!(rebuilt.get_all(), store.get_all());
    assert_eq!(
        ids_and_payloads(rebuilt.oplog().unwrap().get_all_ops()),
        ids_and_payloads(store.oplog().unwrap().get_all_ops())
    );

    // The rebuilt log keeps numbering and replay behavior.
    rebuilt.set("cnn", json!(60));
    assert_eq!(rebuilt.oplog().unwrap().get_all_ops().last().unwrap().op_id, OpId(3));
    rebuilt.oplog().unwrap().jump_to(1).unwrap();
    assert_eq!(rebuilt.get_all(), map(json!({"kkr": 10, "abc": 10})));
}

// --- Replay Round-Trip Law ---

proptest! {
    /// For any op sequence and any recorded target, jump_to reconstructs
    /// exactly the prefix fold, and resume restores the full live state.
    #[test]
    fn prop_jump_to_equals_prefix_fold(
        writes in prop::collection::vec((0..5usize, -1000i64..1000), 1..20),
        target_index in 0usize..19,
    ) {
        let store = logged_store(json!({"base": true}));
        for (key_index, value) in &writes {
            store.set(format!("k{}", key_index), json!(value));
        }
        let live = store.get_all();

        let target = (target_index % writes.len()) + 1;

        // Independent model: baseline plus the first `target` writes.
        let mut expected = map(json!({"base": true}));
        for (key_index, value) in writes.iter().take(target) {
            expected.insert(format!("k{}", key_index), json!(value));
        }

        let oplog = store.oplog().unwrap();
        oplog.jump_to(target as i64).unwrap();
        prop_assert_eq!(store.get_all(), expected);

        oplog.resume();
        prop_assert_eq!(store.get_all(), live);
    }
}
