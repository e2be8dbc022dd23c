//! Tests for binding.rs: initial values, live updates, transforms,
//! deduplication, two-way writes and teardown.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use weft_model::{AppSchema, BindingSource, BindingSpec, DataModel, FieldDef, JsonMap, Transform};
use weft_runtime::{
    BindingEngine, BindingTarget, EventKind, RuntimeConfig, RuntimeContext, RuntimeError, StateKey,
};

fn setup() -> (RuntimeContext, BindingEngine) {
    let ctx = RuntimeContext::new(AppSchema::default(), RuntimeConfig::default());
    ctx.store.register_models(&[DataModel::new(
        "task",
        vec![FieldDef::text("title").required(), FieldDef::number("estimate")],
    )]);
    let engine = BindingEngine::new(ctx.clone());
    (ctx, engine)
}

fn target() -> (Arc<Mutex<Vec<Value>>>, Option<Arc<BindingTarget>>) {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&writes);
    let target: Arc<BindingTarget> =
        Arc::new(move |v: &Value| sink.lock().unwrap().push(v.clone()));
    (writes, Some(target))
}

fn map(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

fn add_task(ctx: &RuntimeContext, id: &str, title: &str) {
    ctx.store
        .create_record("task", map(json!({"id": id, "title": title})))
        .unwrap();
}

// ── State sources ───────────────────────────────────────────────

#[test]
fn state_binding_writes_initial_value_then_follows_changes() {
    let (ctx, engine) = setup();
    ctx.state.set_custom("draft", json!("hello"));
    let (writes, target) = target();

    engine
        .register("title-input", BindingSpec::state("value", "custom:draft"), target)
        .unwrap();
    ctx.state.set_custom("draft", json!("hello world"));

    assert_eq!(*writes.lock().unwrap(), vec![json!("hello"), json!("hello world")]);
    assert_eq!(engine.prop("title-input", "value"), Some(json!("hello world")));
}

#[test]
fn state_path_narrows_the_value() {
    let (ctx, engine) = setup();
    let spec = BindingSpec::new(
        "label",
        BindingSource::State {
            key: "page".into(),
            path: Some("current".into()),
        },
    );
    engine.register("crumb", spec, None).unwrap();
    assert_eq!(engine.prop("crumb", "label"), Some(Value::Null));

    ctx.state.set_page("settings", JsonMap::new());
    assert_eq!(engine.prop("crumb", "label"), Some(json!("settings")));
}

#[test]
fn invalid_state_key_is_rejected() {
    let (_, engine) = setup();
    let err = engine
        .register("x", BindingSpec::state("value", "nonsense"), None)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidStateKey(_)));
    assert_eq!(engine.binding_count(), 0);
}

// ── Record sources ──────────────────────────────────────────────

#[test]
fn field_binding_tracks_one_record() {
    let (ctx, engine) = setup();
    add_task(&ctx, "t1", "Buy milk");
    add_task(&ctx, "t2", "Walk dog");

    engine
        .register(
            "header",
            BindingSpec::field("text", "task", "t2", "title").with_transform(Transform::Uppercase),
            None,
        )
        .unwrap();
    assert_eq!(engine.prop("header", "text"), Some(json!("WALK DOG")));

    ctx.store
        .update_record("task", "t2", map(json!({"title": "Walk cat"})))
        .unwrap();
    assert_eq!(engine.prop("header", "text"), Some(json!("WALK CAT")));

    ctx.store.delete_record("task", "t2").unwrap();
    assert_eq!(engine.prop("header", "text"), Some(Value::Null));
}

#[test]
fn field_binding_without_record_id_uses_first_record() {
    let (ctx, engine) = setup();
    let spec = BindingSpec::new(
        "text",
        BindingSource::Field {
            model_id: "task".into(),
            record_id: None,
            field: "title".into(),
        },
    );
    engine.register("first", spec, None).unwrap();
    assert_eq!(engine.prop("first", "text"), Some(Value::Null));

    add_task(&ctx, "t1", "Only task");
    assert_eq!(engine.prop("first", "text"), Some(json!("Only task")));
}

#[test]
fn collection_binding_with_count_and_suffix() {
    let (ctx, engine) = setup();
    let spec = BindingSpec::collection("text", "task")
        .with_transform(Transform::Count)
        .with_transform(Transform::Suffix { value: " tasks".into() });
    engine.register("task-count", spec, None).unwrap();
    assert_eq!(engine.prop("task-count", "text"), Some(json!("0 tasks")));

    add_task(&ctx, "t1", "a");
    add_task(&ctx, "t2", "b");
    assert_eq!(engine.prop("task-count", "text"), Some(json!("2 tasks")));
}

// ── Deduplication and events ────────────────────────────────────

#[test]
fn unchanged_transformed_values_are_not_rewritten() {
    let (ctx, engine) = setup();
    let (writes, target) = target();
    engine
        .register(
            "count",
            BindingSpec::collection("text", "task").with_transform(Transform::Count),
            target,
        )
        .unwrap();

    add_task(&ctx, "t1", "a");
    // Count stays at 1.
    ctx.store
        .update_record("task", "t1", map(json!({"title": "b"})))
        .unwrap();

    assert_eq!(*writes.lock().unwrap(), vec![json!(0), json!(1)]);
}

#[test]
fn updates_emit_binding_events() {
    let (ctx, engine) = setup();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    ctx.bus
        .on(EventKind::BindingUpdated, move |e| sink.lock().unwrap().push(e.payload.clone()));

    engine
        .register("c", BindingSpec::state("value", "custom:k"), None)
        .unwrap();
    ctx.state.set_custom("k", json!(1));

    assert_eq!(events.lock().unwrap().len(), 2);
}

#[test]
fn failing_target_does_not_break_the_binding() {
    let (ctx, engine) = setup();
    let target: Arc<BindingTarget> = Arc::new(|v: &Value| {
        if v == &json!("boom") {
            panic!("renderer failure");
        }
    });
    engine
        .register("c", BindingSpec::state("value", "custom:k"), Some(target))
        .unwrap();

    ctx.state.set_custom("k", json!("boom"));
    ctx.state.set_custom("k", json!("fine"));
    assert_eq!(engine.prop("c", "value"), Some(json!("fine")));
}

// ── Two-way ─────────────────────────────────────────────────────

#[test]
fn two_way_state_binding_writes_back() {
    let (ctx, engine) = setup();
    engine
        .register("title-input", BindingSpec::state("value", "custom:draft").two_way(), None)
        .unwrap();

    engine.write_back("title-input", "value", json!("typed")).unwrap();

    assert_eq!(ctx.state.custom("draft"), Some(json!("typed")));
    assert_eq!(engine.prop("title-input", "value"), Some(json!("typed")));
}

#[test]
fn two_way_write_inverts_the_transform_pipeline() {
    let (ctx, engine) = setup();
    add_task(&ctx, "t1", "a");
    let spec = BindingSpec::field("text", "task", "t1", "estimate")
        .with_transform(Transform::ToString)
        .with_transform(Transform::Prefix { value: "~".into() })
        .two_way();
    engine.register("estimate", spec, None).unwrap();

    engine.write_back("estimate", "text", json!("~8")).unwrap();

    let record = ctx.store.get_record("task", "t1").unwrap();
    assert_eq!(record.get("estimate"), Some(&json!(8)));
    assert_eq!(engine.prop("estimate", "text"), Some(json!("~8")));
}

#[test]
fn two_way_state_path_updates_nested_value() {
    let (ctx, engine) = setup();
    ctx.state.set_custom("filter", json!({"status": "open", "limit": 10}));
    let spec = BindingSpec::new(
        "value",
        BindingSource::State {
            key: "custom:filter".into(),
            path: Some("status".into()),
        },
    )
    .two_way();
    engine.register("status-select", spec, None).unwrap();

    engine.write_back("status-select", "value", json!("done")).unwrap();
    assert_eq!(
        ctx.state.custom("filter"),
        Some(json!({"status": "done", "limit": 10}))
    );
}

#[test]
fn writes_to_one_way_or_collection_bindings_fail() {
    let (_, engine) = setup();
    engine
        .register("a", BindingSpec::state("value", "custom:x"), None)
        .unwrap();
    engine
        .register("b", BindingSpec::collection("items", "task").two_way(), None)
        .unwrap();

    assert!(matches!(
        engine.write_back("a", "value", json!(1)),
        Err(RuntimeError::NotWritable(_))
    ));
    assert!(matches!(
        engine.write_back("b", "items", json!([])),
        Err(RuntimeError::NotWritable(_))
    ));
    assert!(matches!(
        engine.write_back("missing", "value", json!(1)),
        Err(RuntimeError::BindingNotFound { .. })
    ));
}

#[test]
fn write_to_field_without_records_fails() {
    let (_, engine) = setup();
    let spec = BindingSpec::new(
        "text",
        BindingSource::Field {
            model_id: "task".into(),
            record_id: None,
            field: "title".into(),
        },
    )
    .two_way();
    engine.register("first", spec, None).unwrap();
    assert!(matches!(
        engine.write_back("first", "text", json!("x")),
        Err(RuntimeError::RecordNotFound { .. })
    ));
}

// ── Lifecycle ───────────────────────────────────────────────────

#[test]
fn re_registering_supersedes_the_previous_binding() {
    let (ctx, engine) = setup();
    let (old_writes, old_target) = target();
    engine
        .register("c", BindingSpec::state("value", "custom:a"), old_target)
        .unwrap();
    engine
        .register("c", BindingSpec::state("value", "custom:b"), None)
        .unwrap();

    ctx.state.set_custom("a", json!("ignored"));
    ctx.state.set_custom("b", json!("used"));

    assert_eq!(*old_writes.lock().unwrap(), vec![Value::Null]);
    assert_eq!(engine.prop("c", "value"), Some(json!("used")));
    assert_eq!(engine.binding_count(), 1);
    assert_eq!(ctx.state.subscriber_count(), 1);
}

#[test]
fn unregister_stops_updates_and_releases_subscriptions() {
    let (ctx, engine) = setup();
    engine
        .register("c", BindingSpec::state("value", "custom:a"), None)
        .unwrap();
    engine
        .register("c", BindingSpec::collection("items", "task"), None)
        .unwrap();
    engine
        .register("d", BindingSpec::state("value", "custom:a"), None)
        .unwrap();

    assert!(engine.unregister("d", "value"));
    assert!(!engine.unregister("d", "value"));
    assert_eq!(engine.unregister_component("c"), 2);
    assert_eq!(engine.binding_count(), 0);
    assert_eq!(ctx.state.subscriber_count(), 0);
    assert_eq!(ctx.store.subscriber_count("task"), 0);
    assert!(engine.props("c").is_empty());

    ctx.state.set_custom("a", json!(1));
    assert_eq!(engine.prop("d", "value"), None);
}

#[test]
fn props_and_spec_accessors() {
    let (ctx, engine) = setup();
    ctx.state.set_custom("a", json!("x"));
    engine
        .register("c", BindingSpec::state("value", "custom:a"), None)
        .unwrap();
    engine
        .register("c", BindingSpec::state("hint", "ui:loading"), None)
        .unwrap();

    let props = engine.props("c");
    assert_eq!(props.get("value"), Some(&json!("x")));
    assert_eq!(props.get("hint"), Some(&json!(false)));
    assert_eq!(
        engine.spec("c", "hint").map(|s| s.source),
        Some(BindingSource::State {
            key: StateKey::Loading.to_string(),
            path: None
        })
    );

    engine.clear();
    assert_eq!(engine.binding_count(), 0);
}
