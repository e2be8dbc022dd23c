//! Tests for state.rs: key subscriptions, page and modal state, component
//! patches, notifications and their auto-dismiss timers.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weft_model::{JsonMap, NotificationKind, NotificationSpec, ThemeMode};
use weft_runtime::{
    ComponentStatePatch, EventBus, EventKind, RuntimeError, StateChange, StateKey, StateManager,
};

fn manager() -> (Arc<EventBus>, StateManager) {
    let bus = Arc::new(EventBus::new());
    let state = StateManager::new(Arc::clone(&bus), 5000, 0);
    (bus, state)
}

fn record_changes(state: &StateManager) -> Arc<Mutex<Vec<StateChange>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    state.subscribe_all(move |change| sink.lock().unwrap().push(change.clone()));
    changes
}

fn params(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

// ── Subscriptions ───────────────────────────────────────────────

#[test]
fn key_subscribers_get_new_and_previous_values() {
    let (_, state) = manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    state.subscribe(StateKey::Custom("filter".into()), move |value, previous| {
        sink.lock().unwrap().push((value.clone(), previous.clone()));
    });

    state.set_custom("filter", json!("open"));
    state.set_custom("other", json!(1));
    state.set_custom("filter", json!("done"));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(json!("open"), Value::Null), (json!("done"), json!("open"))]
    );
}

#[test]
fn unchanged_values_notify_nobody() {
    let (bus, state) = manager();
    let changes = record_changes(&state);
    let events = Arc::new(Mutex::new(0));
    let count = Arc::clone(&events);
    bus.on(EventKind::StateChanged, move |_| *count.lock().unwrap() += 1);

    state.set_custom("x", json!(1));
    state.set_custom("x", json!(1));
    state.set_loading(false);
    state.set_theme_mode(ThemeMode::Light);

    assert_eq!(changes.lock().unwrap().len(), 1);
    assert_eq!(*events.lock().unwrap(), 1);
}

#[test]
fn global_subscribers_see_every_key() {
    let (_, state) = manager();
    let changes = record_changes(&state);

    state.set_loading(true);
    state.set_theme_mode(ThemeMode::Dark);
    state.set_component_visible("panel", false);

    let keys: Vec<String> = changes.lock().unwrap().iter().map(|c| c.key.to_string()).collect();
    assert_eq!(keys, vec!["ui:loading", "ui:theme", "component:panel"]);
}

#[test]
fn unsubscribe_and_clear_subscriptions() {
    let (_, state) = manager();
    let hits = Arc::new(Mutex::new(0));
    let a = Arc::clone(&hits);
    let sub = state.subscribe(StateKey::Loading, move |_, _| *a.lock().unwrap() += 1);
    let b = Arc::clone(&hits);
    state.subscribe_all(move |_| *b.lock().unwrap() += 1);
    assert_eq!(state.subscriber_count(), 2);

    state.set_loading(true);
    assert!(sub.unsubscribe());
    state.set_loading(false);
    state.clear_subscriptions();
    state.set_loading(true);

    assert_eq!(*hits.lock().unwrap(), 3);
    assert_eq!(state.subscriber_count(), 0);
}

#[test]
fn panicking_subscriber_does_not_stop_the_change() {
    let (_, state) = manager();
    state.subscribe(StateKey::Loading, |_, _| panic!("bad subscriber"));
    let changes = record_changes(&state);

    state.set_loading(true);
    assert!(state.is_loading());
    assert_eq!(changes.lock().unwrap().len(), 1);
}

#[test]
fn subscriber_may_write_other_keys() {
    let (_, state) = manager();
    let mirror = state.clone();
    state.subscribe(StateKey::Custom("source".into()), move |value, _| {
        mirror.set_custom("mirror", value.clone());
    });

    state.set_custom("source", json!(42));
    assert_eq!(state.custom("mirror"), Some(json!(42)));
}

// ── Page and modals ─────────────────────────────────────────────

#[test]
fn set_page_tracks_previous_and_emits() {
    let (bus, state) = manager();
    let pages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pages);
    bus.on(EventKind::PageChanged, move |e| sink.lock().unwrap().push(e.payload.clone()));

    state.set_page("home", JsonMap::new());
    state.set_page("detail", params(json!({"id": "t1"})));

    let page = state.page();
    assert_eq!(page.current.as_deref(), Some("detail"));
    assert_eq!(page.previous.as_deref(), Some("home"));
    assert_eq!(page.params.get("id"), Some(&json!("t1")));
    assert_eq!(pages.lock().unwrap().len(), 2);
    assert_eq!(state.get(&StateKey::Page)["current"], json!("detail"));
}

#[test]
fn modals_open_and_close() {
    let (bus, state) = manager();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.on(EventKind::ModalChanged, move |e| sink.lock().unwrap().push(e.payload.clone()));

    state.open_modal("confirm", json!({"recordId": "t1"}));
    assert!(state.is_modal_open("confirm"));
    assert_eq!(state.modal_data("confirm"), Some(json!({"recordId": "t1"})));
    assert_eq!(
        state.get(&StateKey::Modal("confirm".into())),
        json!({"open": true, "data": {"recordId": "t1"}})
    );

    assert!(state.close_modal("confirm"));
    assert!(!state.close_modal("confirm"));
    assert!(!state.is_modal_open("confirm"));
    assert_eq!(
        state.get(&StateKey::Modal("confirm".into())),
        json!({"open": false, "data": null})
    );
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[test]
fn reopening_a_modal_with_new_data_notifies_its_subscribers() {
    let (_, state) = manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    state.subscribe(StateKey::Modal("edit".into()), move |new, _| {
        sink.lock().unwrap().push(new["data"]["recordId"].clone())
    });

    state.open_modal("edit", json!({"recordId": "t1"}));
    state.open_modal("edit", json!({"recordId": "t2"}));
    state.open_modal("edit", json!({"recordId": "t2"}));

    assert_eq!(*seen.lock().unwrap(), vec![json!("t1"), json!("t2")]);
    assert_eq!(state.modal_data("edit"), Some(json!({"recordId": "t2"})));
}

// ── Components ──────────────────────────────────────────────────

#[test]
fn untouched_components_report_defaults() {
    let (_, state) = manager();
    let component = state.component_state("never-seen");
    assert!(component.visible);
    assert!(!component.disabled);
    assert_eq!(component.value, Value::Null);
}

#[test]
fn component_patches_merge() {
    let (_, state) = manager();
    state.set_component_value("input", json!("abc"));
    state.set_component_error("input", Some("too short".into()));
    let mut custom = JsonMap::new();
    custom.insert("touched".into(), json!(true));
    state.set_component_state(
        "input",
        ComponentStatePatch {
            disabled: Some(true),
            custom,
            ..Default::default()
        },
    );

    let component = state.component_state("input");
    assert_eq!(component.value, json!("abc"));
    assert_eq!(component.error.as_deref(), Some("too short"));
    assert!(component.disabled);
    assert_eq!(component.custom.get("touched"), Some(&json!(true)));

    state.set_component_error("input", None);
    assert_eq!(state.component_state("input").error, None);
}

// ── Generic set/get ─────────────────────────────────────────────

#[test]
fn generic_set_routes_by_key() {
    let (_, state) = manager();
    state.set(&"custom:count".parse().unwrap(), json!(3)).unwrap();
    state.set(&StateKey::Loading, json!(true)).unwrap();
    state.set(&StateKey::Theme, json!("dark")).unwrap();
    state.set(&StateKey::Modal("m".into()), json!(true)).unwrap();
    state
        .set(&StateKey::Component("c".into()), json!({"visible": false}))
        .unwrap();

    assert_eq!(state.custom("count"), Some(json!(3)));
    assert!(state.is_loading());
    assert_eq!(state.theme_mode(), ThemeMode::Dark);
    assert!(state.is_modal_open("m"));
    assert!(!state.component_state("c").visible);

    state.set(&StateKey::Modal("m".into()), json!(false)).unwrap();
    assert!(!state.is_modal_open("m"));

    state
        .set(&StateKey::Modal("m".into()), json!({"open": true, "data": {"step": 2}}))
        .unwrap();
    assert_eq!(state.modal_data("m"), Some(json!({"step": 2})));
    state.set(&StateKey::Modal("m".into()), json!({"open": false})).unwrap();
    assert!(!state.is_modal_open("m"));
}

#[test]
fn page_and_notifications_are_not_writable_generically() {
    let (_, state) = manager();
    for key in [StateKey::Page, StateKey::Notifications] {
        let err = state.set(&key, json!("x")).unwrap_err();
        assert!(matches!(err, RuntimeError::NotWritable(_)));
    }
    assert!(matches!(
        state.set(&StateKey::Theme, json!("sepia")),
        Err(RuntimeError::Serialization(_))
    ));
}

#[test]
fn reset_restores_defaults_and_notifies_changed_keys() {
    let (_, state) = manager();
    state.set_page("home", JsonMap::new());
    state.set_custom("a", json!(1));
    state.set_theme_mode(ThemeMode::Dark);
    let changes = record_changes(&state);

    state.reset();

    let snapshot = state.snapshot();
    assert_eq!(snapshot.page.current, None);
    assert!(snapshot.custom.is_empty());
    assert_eq!(snapshot.theme_mode, ThemeMode::Light);

    let mut keys: Vec<String> = changes.lock().unwrap().iter().map(|c| c.key.to_string()).collect();
    keys.sort();
    assert_eq!(keys, vec!["custom:a", "page", "ui:theme"]);
    // Subscriptions survive a reset.
    assert_eq!(state.subscriber_count(), 1);
}

// ── Notifications ───────────────────────────────────────────────

#[test]
fn notifications_without_runtime_persist() {
    let (_, state) = manager();
    let id = state.show_notification(NotificationSpec::success("Saved").titled("Done"));

    let shown = state.notifications();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].id, id);
    assert_eq!(shown[0].kind, NotificationKind::Success);
    assert_eq!(shown[0].title.as_deref(), Some("Done"));
    assert_eq!(shown[0].duration_ms, 5000);

    assert!(state.dismiss_notification(id));
    assert!(!state.dismiss_notification(id));
    assert!(state.notifications().is_empty());
}

#[test]
fn max_notifications_drops_the_oldest() {
    let bus = Arc::new(EventBus::new());
    let state = StateManager::new(bus, 0, 2);
    for message in ["one", "two", "three"] {
        state.show_notification(NotificationSpec::info(message));
    }
    let messages: Vec<String> = state.notifications().into_iter().map(|n| n.message).collect();
    assert_eq!(messages, vec!["two", "three"]);
}

#[test]
fn notification_events_are_emitted() {
    let (bus, state) = manager();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    bus.on_any(move |e| sink.lock().unwrap().push(e.kind()));

    let id = state.show_notification(NotificationSpec::warning("Careful").lasting(0));
    state.dismiss_notification(id);

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![
            EventKind::StateChanged,
            EventKind::NotificationShown,
            EventKind::StateChanged,
            EventKind::NotificationDismissed
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn notification_auto_dismisses_after_duration() {
    let (_, state) = manager();
    state.show_notification(NotificationSpec::info("Saved").lasting(3000));

    tokio::time::sleep(Duration::from_millis(2999)).await;
    tokio::task::yield_now().await;
    assert_eq!(state.notifications().len(), 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    tokio::task::yield_now().await;
    assert!(state.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn default_duration_applies_when_unset() {
    let (_, state) = manager();
    state.show_notification(NotificationSpec::info("Hello"));

    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(state.notifications().len(), 1);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    tokio::task::yield_now().await;
    assert!(state.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_duration_persists() {
    let (_, state) = manager();
    state.show_notification(NotificationSpec::error("Broken").lasting(0));

    tokio::time::sleep(Duration::from_secs(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(state.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_dismiss_leaves_timer_harmless() {
    let (bus, state) = manager();
    let dismissed = Arc::new(Mutex::new(0));
    let count = Arc::clone(&dismissed);
    bus.on(EventKind::NotificationDismissed, move |_| *count.lock().unwrap() += 1);

    let first = state.show_notification(NotificationSpec::info("first").lasting(1000));
    assert!(state.dismiss_notification(first));
    let second = state.show_notification(NotificationSpec::info("second").lasting(0));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    tokio::task::yield_now().await;

    let remaining = state.notifications();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second);
    assert_eq!(*dismissed.lock().unwrap(), 1);
}
