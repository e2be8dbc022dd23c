//! Tests for data_store.rs and query.rs.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use weft_model::{DataModel, FieldDef, JsonMap};
use weft_runtime::{DataStore, EventBus, EventKind, EventPayload, Query, RecordSet, RuntimeError};

fn map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn task_model() -> DataModel {
    DataModel::new(
        "task",
        vec![
            FieldDef::text("title").required(),
            FieldDef::boolean("done"),
            FieldDef::select("priority", &["low", "high"]).with_default("low"),
        ],
    )
}

fn store() -> (Arc<EventBus>, DataStore) {
    let bus = Arc::new(EventBus::new());
    let store = DataStore::new(Arc::clone(&bus));
    store.register_models(&[task_model(), DataModel::new("note", vec![])]);
    (bus, store)
}

fn record_sets(store: &DataStore, model: &str) -> Arc<Mutex<Vec<RecordSet>>> {
    let sets = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sets);
    store.subscribe(model, move |set| sink.lock().unwrap().push(set.clone()));
    sets
}

// ── Create ──────────────────────────────────────────────────────

#[test]
fn create_fills_defaults_and_generates_id() {
    let (_, store) = store();
    let record = store.create_record("task", map(json!({"title": "Buy milk"}))).unwrap();

    assert!(!record.id.as_str().is_empty());
    assert_eq!(record.model, "task");
    assert_eq!(record.get("done"), Some(&json!(false)));
    assert_eq!(record.get("priority"), Some(&json!("low")));
    assert_eq!(store.get_record("task", record.id.as_str()), Some(record));
}

#[test]
fn create_uses_provided_id_and_rejects_duplicates() {
    let (_, store) = store();
    let record = store
        .create_record("task", map(json!({"id": "t1", "title": "a"})))
        .unwrap();
    assert_eq!(record.id.as_str(), "t1");
    assert!(!record.data.contains_key("id"));

    let err = store
        .create_record("task", map(json!({"id": "t1", "title": "b"})))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DuplicateRecord { ref id, .. } if id == "t1"));
    assert_eq!(store.get_records("task").len(), 1);
}

#[test]
fn create_requires_required_fields() {
    let (_, store) = store();
    for data in [json!({}), json!({"title": ""}), json!({"title": null})] {
        let err = store.create_record("task", map(data)).unwrap_err();
        assert!(matches!(err, RuntimeError::MissingField { ref field, .. } if field == "title"));
    }
    assert!(store.get_records("task").is_empty());
}

#[test]
fn create_in_unknown_model_fails() {
    let (_, store) = store();
    let err = store.create_record("ghost", JsonMap::new()).unwrap_err();
    assert!(matches!(err, RuntimeError::ModelNotFound(ref m) if m == "ghost"));
}

// ── Notification contract ───────────────────────────────────────

#[test]
fn every_mutation_notifies_subscribers_once_with_full_set() {
    let (_, store) = store();
    let sets = record_sets(&store, "task");

    let a = store.create_record("task", map(json!({"title": "a"}))).unwrap();
    store.create_record("task", map(json!({"title": "b"}))).unwrap();
    store
        .update_record("task", a.id.as_str(), map(json!({"done": true})))
        .unwrap();
    store.delete_record("task", a.id.as_str()).unwrap();

    let sets = sets.lock().unwrap();
    assert_eq!(sets.len(), 4);
    assert_eq!(
        sets.iter().map(|s| s.records.len()).collect::<Vec<_>>(),
        vec![1, 2, 2, 1]
    );
    assert_eq!(sets.iter().map(|s| s.generation).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(sets[2].records[0].get("done"), Some(&json!(true)));
    assert_eq!(store.generation("task"), Some(4));
}

#[test]
fn subscribers_of_other_models_are_not_notified() {
    let (_, store) = store();
    let notes = record_sets(&store, "note");
    store.create_record("task", map(json!({"title": "a"}))).unwrap();
    assert!(notes.lock().unwrap().is_empty());
}

#[test]
fn mutations_emit_delta_events() {
    let (bus, store) = store();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.on_any(move |e| sink.lock().unwrap().push(e.payload.clone()));

    let a = store.create_record("task", map(json!({"title": "a"}))).unwrap();
    store
        .update_record("task", a.id.as_str(), map(json!({"title": "a2"})))
        .unwrap();
    store.delete_record("task", a.id.as_str()).unwrap();
    store.set_records("note", vec![]).unwrap();

    let events = events.lock().unwrap();
    let kinds: Vec<EventKind> = events.iter().map(EventPayload::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::RecordCreated,
            EventKind::RecordUpdated,
            EventKind::RecordDeleted,
            EventKind::RecordsReplaced
        ]
    );
    match &events[1] {
        EventPayload::RecordUpdated { record, previous, .. } => {
            assert_eq!(previous.get_str("title"), Some("a"));
            assert_eq!(record.get_str("title"), Some("a2"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn subscriber_sees_change_before_event_is_emitted() {
    let (bus, store) = store();
    let order = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::clone(&order);
    store.subscribe("task", move |_| a.lock().unwrap().push("subscriber"));
    let b = Arc::clone(&order);
    bus.on(EventKind::RecordCreated, move |_| b.lock().unwrap().push("event"));

    store.create_record("task", map(json!({"title": "x"}))).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["subscriber", "event"]);
}

#[test]
fn unsubscribed_callbacks_stop_firing() {
    let (_, store) = store();
    let sets = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&sets);
    let sub = store.subscribe("task", move |_| *sink.lock().unwrap() += 1);

    store.create_record("task", map(json!({"title": "a"}))).unwrap();
    sub.unsubscribe();
    store.create_record("task", map(json!({"title": "b"}))).unwrap();

    assert_eq!(*sets.lock().unwrap(), 1);
    assert_eq!(store.subscriber_count("task"), 0);
}

#[test]
fn subscriber_may_mutate_another_model() {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(DataStore::new(Arc::clone(&bus)));
    store.register_models(&[task_model(), DataModel::new("log", vec![])]);

    let weak = Arc::downgrade(&store);
    store.subscribe("task", move |set| {
        if let Some(store) = weak.upgrade() {
            let mut entry = JsonMap::new();
            entry.insert("count".into(), json!(set.records.len()));
            store.create_record("log", entry).unwrap();
        }
    });

    store.create_record("task", map(json!({"title": "a"}))).unwrap();
    let log = store.get_records("log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].get("count"), Some(&json!(1)));
}

// ── Update / delete / replace ───────────────────────────────────

#[test]
fn update_is_a_shallow_merge_that_keeps_the_id() {
    let (_, store) = store();
    let created = store
        .create_record("task", map(json!({"id": "t1", "title": "a", "tags": ["x"]})))
        .unwrap();
    let updated = store
        .update_record("task", "t1", map(json!({"id": "other", "tags": ["y"], "done": true})))
        .unwrap();

    assert_eq!(updated.id.as_str(), "t1");
    assert_eq!(updated.get("title"), Some(&json!("a")));
    assert_eq!(updated.get("tags"), Some(&json!(["y"])));
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.modified_at >= created.modified_at);
}

#[test]
fn update_and_delete_missing_records_fail() {
    let (_, store) = store();
    assert!(matches!(
        store.update_record("task", "nope", JsonMap::new()),
        Err(RuntimeError::RecordNotFound { .. })
    ));
    assert!(matches!(
        store.delete_record("task", "nope"),
        Err(RuntimeError::RecordNotFound { .. })
    ));
    assert!(matches!(
        store.delete_record("ghost", "nope"),
        Err(RuntimeError::ModelNotFound(_))
    ));
}

#[test]
fn set_records_replaces_the_collection() {
    let (_, store) = store();
    store.create_record("task", map(json!({"title": "old"}))).unwrap();
    let sets = record_sets(&store, "task");

    let fresh = vec![
        store.build_record("task", map(json!({"id": "n1", "title": "new 1"}))).unwrap(),
        store.build_record("task", map(json!({"id": "n2", "title": "new 2"}))).unwrap(),
    ];
    store.set_records("task", fresh).unwrap();

    let records = store.get_records("task");
    assert_eq!(
        records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["n1", "n2"]
    );
    assert_eq!(sets.lock().unwrap().len(), 1);
}

#[test]
fn set_records_rejects_repeated_ids_and_keeps_the_collection() {
    let (_, store) = store();
    let kept = store.create_record("task", map(json!({"title": "kept"}))).unwrap();
    let sets = record_sets(&store, "task");

    let rows = vec![
        store.build_record("task", map(json!({"id": "x", "title": "first"}))).unwrap(),
        store.build_record("task", map(json!({"id": "x", "title": "second"}))).unwrap(),
    ];
    let err = store.set_records("task", rows).unwrap_err();

    assert!(matches!(
        err,
        RuntimeError::DuplicateRecord { ref model, ref id } if model == "task" && id == "x"
    ));
    let records = store.get_records("task");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, kept.id);
    assert!(sets.lock().unwrap().is_empty());
}

#[test]
fn models_and_clear() {
    let (_, store) = store();
    store.create_record("task", map(json!({"title": "a"}))).unwrap();
    assert_eq!(store.models(), vec!["note".to_string(), "task".to_string()]);

    store.clear();
    assert!(store.models().is_empty());
    assert!(store.get_records("task").is_empty());
    assert_eq!(store.generation("task"), None);
}

// ── Queries ─────────────────────────────────────────────────────

#[test]
fn query_filters_by_equality_containment_and_limit() {
    let (_, store) = store();
    for (title, priority, tags) in [
        ("milk", "high", json!(["shop"])),
        ("bread", "low", json!(["shop", "bakery"])),
        ("taxes", "high", json!(["admin"])),
    ] {
        store
            .create_record(
                "task",
                map(json!({"title": title, "priority": priority, "tags": tags})),
            )
            .unwrap();
    }

    let high = store.query("task", &Query::new().eq("priority", "high"));
    assert_eq!(
        high.iter().filter_map(|r| r.get_str("title")).collect::<Vec<_>>(),
        vec!["milk", "taxes"]
    );

    let shop = store.query("task", &Query::new().contains("tags", "shop").limit(1));
    assert_eq!(shop.len(), 1);
    assert_eq!(shop[0].get_str("title"), Some("milk"));

    let substring = store.query("task", &Query::new().contains("title", "ax"));
    assert_eq!(substring.len(), 1);

    let query = Query::new().eq("priority", "low").contains("tags", "bakery");
    let combined = store.query("task", &query);
    assert_eq!(combined.len(), 1);
    assert!(store.query("ghost", &Query::new()).is_empty());
}

#[test]
fn query_parses_from_json() {
    let query: Query = serde_json::from_value(json!({
        "filters": [{"op": "equals", "field": "done", "value": false}],
        "limit": 5
    }))
    .unwrap();
    assert_eq!(query, Query::new().eq("done", false).limit(5));
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn created_records_are_listed_in_insertion_order(
        titles in prop::collection::vec("[a-z]{1,12}", 0..20)
    ) {
        let (_, store) = store();
        let mut ids = Vec::new();
        for title in &titles {
            let record = store.create_record("task", map(json!({"title": title}))).unwrap();
            ids.push(record.id.to_string());
        }
        let records = store.get_records("task");
        prop_assert_eq!(records.len(), titles.len());
        for ((record, id), title) in records.iter().zip(&ids).zip(&titles) {
            prop_assert_eq!(record.id.as_str(), id.as_str());
            prop_assert_eq!(record.get_str("title"), Some(title.as_str()));
        }
        prop_assert_eq!(store.generation("task"), Some(titles.len() as u64));
    }
}
