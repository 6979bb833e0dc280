use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;

use seshat::{
    AckLevel, BatchExecutor, BatchRequest, DurabilityTracker, LocalDurabilityTracker, OpTime,
    ShardingRuntime, WaitStatus, WriteErrorKind,
};

use mock_store::{ManualTracker, MemoryJournal, MemoryStore};

fn executor_with_tracker(tracker: Arc<dyn DurabilityTracker>) -> (Arc<MemoryStore>, BatchExecutor) {
    let store = Arc::new(MemoryStore::new());
    let executor = BatchExecutor::new(
        store.clone(),
        Arc::new(MemoryJournal::new()),
        tracker,
        Arc::new(ShardingRuntime::disabled()),
        json!({"w": 1}),
    );
    (store, executor)
}

#[test]
fn malformed_spec_is_a_synchronous_error() {
    let tracker = Arc::new(ManualTracker::default());
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1})])
        .with_write_concern(json!({"w": true}));
    let response = executor.execute(&request);

    // The write itself succeeded; only the durability report is bad.
    assert_eq!(response.n, Some(1));
    let wc_error = response.write_concern_error.unwrap();
    assert_eq!(wc_error.kind, WriteErrorKind::BadValue);
    assert!(!wc_error.timed_out);
    // A spec that fails validation is never waited on.
    assert_eq!(tracker.calls(), 0);
}

#[test]
fn unreachable_durability_level_times_out() {
    let tracker = Arc::new(LocalDurabilityTracker::new());
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1}), json!({"b": 2})])
        .with_write_concern(json!({"w": 2, "wtimeout": 20}));
    let response = executor.execute(&request);

    // All items applied; the guarantee was simply never observed.
    assert_eq!(response.n, Some(2));
    assert!(response.errors.is_empty());
    let wc_error = response.write_concern_error.unwrap();
    assert_eq!(wc_error.kind, WriteErrorKind::WriteConcernFailed);
    assert!(wc_error.timed_out);
}

#[test]
fn wait_is_satisfied_once_replication_catches_up() {
    let tracker = Arc::new(LocalDurabilityTracker::new());
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let advancer = {
        let tracker = Arc::clone(&tracker);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tracker.advance_to(OpTime(u64::MAX));
        })
    };

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1})])
        .with_write_concern(json!({"w": 1, "wtimeout": 5000}));
    let response = executor.execute(&request);
    advancer.join().unwrap();

    assert_eq!(response.n, Some(1));
    assert!(response.write_concern_error.is_none());
}

#[test]
fn wait_is_skipped_when_every_item_fails() {
    let tracker = Arc::new(ManualTracker::new(WaitStatus::TimedOut));
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!(1), json!(2)]).with_ordered(false);
    let response = executor.execute(&request);

    assert_eq!(response.n, Some(0));
    assert_eq!(response.errors.len(), 2);
    assert!(response.write_concern_error.is_none());
    assert_eq!(tracker.calls(), 0);
}

#[test]
fn default_write_concern_applies_when_request_has_none() {
    let tracker = Arc::new(ManualTracker::default());
    let (_store, executor) = executor_with_tracker(tracker.clone());

    executor.execute(&BatchRequest::insert("db.users", vec![json!({"a": 1})]));

    assert_eq!(tracker.calls(), 1);
    assert_eq!(tracker.last_options().unwrap().ack, AckLevel::Nodes(1));
}

#[test]
fn requested_spec_overrides_the_default() {
    let tracker = Arc::new(ManualTracker::default());
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1})])
        .with_write_concern(json!({"w": "majority", "j": true}));
    executor.execute(&request);

    let options = tracker.last_options().unwrap();
    assert_eq!(options.ack, AckLevel::Majority);
    assert!(options.journal);
}

#[test]
fn wait_failure_is_translated_without_undoing_writes() {
    let tracker = Arc::new(ManualTracker::new(WaitStatus::Failed {
        kind: WriteErrorKind::Storage(123),
        message: "no node carries tag rack-9".to_string(),
    }));
    let (store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1})])
        .with_write_concern(json!({"w": "rack-9"}));
    let response = executor.execute(&request);

    assert_eq!(response.n, Some(1));
    let wc_error = response.write_concern_error.unwrap();
    assert_eq!(wc_error.kind, WriteErrorKind::Storage(123));
    assert!(!wc_error.timed_out);
    // The applied write stays applied.
    assert_eq!(store.documents("db.users").len(), 1);
}

#[test]
fn non_verbose_suppresses_the_durability_error() {
    let tracker = Arc::new(ManualTracker::new(WaitStatus::TimedOut));
    let (_store, executor) = executor_with_tracker(tracker.clone());

    let request = BatchRequest::insert("db.users", vec![json!({"a": 1})]).with_verbose(false);
    let response = executor.execute(&request);

    // The wait itself still ran; only the report is suppressed.
    assert_eq!(tracker.calls(), 1);
    assert!(response.write_concern_error.is_none());
}
