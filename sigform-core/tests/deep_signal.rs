//! Integration tests for deep signals.
//!
//! These tests verify snapshot fidelity, wrap idempotence and the
//! one-notification-per-helper guarantee, plus the todo-list flow through a
//! form.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;

use sigform_core::reactive::{Effect, Runtime};
use sigform_core::{DeepSignal, FormConfig, Map, NodeTree, SigForm, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn v(json: serde_json::Value) -> Value {
    Value::from(json)
}

fn counter(cell: &DeepSignal) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    cell.subscribe(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    count
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
        (0i64..4_000_000_000).prop_map(|secs| match Utc.timestamp_opt(secs, 0).single() {
            Some(date) => Value::from(date),
            None => Value::Null,
        }),
    ]
}

fn document() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
            prop::collection::vec(("[a-z]{1,4}", inner), 0..6)
                .prop_map(|entries| Value::from(entries.into_iter().collect::<Map>())),
        ]
    })
}

proptest! {
    #[test]
    fn snapshot_matches_wrapped_value(value in document()) {
        let cell = DeepSignal::wrap(value.clone());
        prop_assert_eq!(cell.dump(), value.clone());
        prop_assert_eq!(serde_json::to_value(&cell).unwrap(), value.to_json());
    }

    #[test]
    fn set_value_replaces_snapshot(first in document(), second in document()) {
        let cell = DeepSignal::wrap(first);
        cell.set_value(second.clone());
        prop_assert_eq!(cell.dump(), second);
    }
}

#[test]
fn wrapping_a_deep_signal_is_identity() {
    init_tracing();
    let cell = DeepSignal::wrap(v(json!({"a": [1, 2]})));
    let again = DeepSignal::wrap(cell.clone());
    assert!(cell.ptr_eq(&again));

    let count = counter(&cell);
    again.set_value(v(json!({"a": []})));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(cell.dump(), v(json!({"a": []})));
}

#[test]
fn effect_over_rewrapped_cell_runs_once_per_write() {
    let cell = DeepSignal::wrap(v(json!({"n": 1})));
    let wrapped = DeepSignal::wrap(&cell);
    let runs = Arc::new(AtomicUsize::new(0));
    let hits = runs.clone();
    let reader = wrapped.clone();
    let _effect = Effect::new(move || {
        reader.dump();
        hits.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    cell.child("n").unwrap().set_value(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn one_notification_per_structural_helper() {
    init_tracing();
    let items: Vec<Value> = (0..200).map(Value::from).collect();
    let cell = DeepSignal::wrap(Value::from(items));
    let count = counter(&cell);

    cell.push([Value::from(200)]).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    cell.splice(10, Some(50), [Value::from(-1), Value::from(-2)]).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);

    cell.reverse().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);

    cell.sort().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);

    cell.fill(0, Some(0), Some(3)).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert_eq!(cell.len(), 153);
}

#[test]
fn assign_notifies_once_inside_batch() {
    let cell = DeepSignal::wrap(v(json!({"a": 1})));
    let count = counter(&cell);
    Runtime::batch(|| {
        cell.assign([("b", Value::from(2)), ("c", Value::from(3))]).unwrap();
    });
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(cell.keys().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn todo_push_reaches_change_observer() {
    init_tracing();
    let form = SigForm::new(FormConfig::default().with_initial_value(v(json!({"todos": []}))));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    form.on_change(move |value| sink.lock().push(value.clone()));

    let tree = NodeTree::new();
    let root = tree.root(form.marker());
    let node = tree.append(root, Some("todos"));
    let todos = form.mount_field(tree.anchor(node), None);
    form.settle().unwrap();
    assert!(seen.lock().is_empty());

    todos.cell().push([v(json!({"id": 1, "task": "buy egg"}))]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], v(json!({"todos": [{"id": 1, "task": "buy egg"}]})));
}
