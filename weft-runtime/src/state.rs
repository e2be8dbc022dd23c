//! Hierarchical application state: page, UI, per-component and custom keys.
//!
//! State is only changed through the setters here. Each setter applies its
//! change, then notifies subscribers of the affected key (and global
//! subscribers) with the new and previous value. Setters that leave the
//! value unchanged notify nobody.

use crate::error::{RuntimeError, RuntimeResult};
use crate::event::EventPayload;
use crate::event_bus::EventBus;
use crate::subscription::{isolate, lock, Subscribers, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use weft_model::{JsonMap, NotificationKind, NotificationSpec, ThemeMode};
use weft_types::{NotificationId, Timestamp};

// ── Keys ──

/// Address of one slice of state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Page,
    Notifications,
    Loading,
    Theme,
    Modal(String),
    Component(String),
    Custom(String),
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => f.write_str("page"),
            Self::Notifications => f.write_str("ui:notifications"),
            Self::Loading => f.write_str("ui:loading"),
            Self::Theme => f.write_str("ui:theme"),
            Self::Modal(id) => write!(f, "modal:{id}"),
            Self::Component(id) => write!(f, "component:{id}"),
            Self::Custom(key) => write!(f, "custom:{key}"),
        }
    }
}

impl FromStr for StateKey {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RuntimeError::InvalidStateKey(s.to_string());
        match s {
            "page" => return Ok(Self::Page),
            "ui:notifications" => return Ok(Self::Notifications),
            "ui:loading" => return Ok(Self::Loading),
            "ui:theme" => return Ok(Self::Theme),
            _ => {}
        }
        let (scope, name) = s.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        match scope {
            "modal" => Ok(Self::Modal(name.to_string())),
            "component" => Ok(Self::Component(name.to_string())),
            "custom" => Ok(Self::Custom(name.to_string())),
            _ => Err(invalid()),
        }
    }
}

// ── State slices ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    pub current: Option<String>,
    pub previous: Option<String>,
    #[serde(default)]
    pub params: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentState {
    pub visible: bool,
    pub disabled: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub value: Value,
    pub custom: JsonMap,
}

impl Default for ComponentState {
    fn default() -> Self {
        Self {
            visible: true,
            disabled: false,
            loading: false,
            error: None,
            value: Value::Null,
            custom: JsonMap::new(),
        }
    }
}

/// Partial update for [`ComponentState`]; `custom` entries are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentStatePatch {
    pub visible: Option<bool>,
    pub disabled: Option<bool>,
    pub loading: Option<bool>,
    pub error: Option<Option<String>>,
    pub value: Option<Value>,
    pub custom: JsonMap,
}

impl ComponentStatePatch {
    fn apply(self, state: &mut ComponentState) {
        if let Some(visible) = self.visible {
            state.visible = visible;
        }
        if let Some(disabled) = self.disabled {
            state.disabled = disabled;
        }
        if let Some(loading) = self.loading {
            state.loading = loading;
        }
        if let Some(error) = self.error {
            state.error = error;
        }
        if let Some(value) = self.value {
            state.value = value;
        }
        state.custom.extend(self.custom);
    }
}

/// A visible notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub title: Option<String>,
    /// Zero means it stays until dismissed.
    pub duration_ms: u64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalState {
    pub open: bool,
    #[serde(default)]
    pub data: Value,
}

/// Full copy of the state tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub page: PageState,
    pub modals: BTreeMap<String, ModalState>,
    pub notifications: Vec<Notification>,
    pub loading: bool,
    pub theme_mode: ThemeMode,
    pub components: BTreeMap<String, ComponentState>,
    pub custom: BTreeMap<String, Value>,
}

impl StateSnapshot {
    fn get(&self, key: &StateKey) -> Value {
        match key {
            StateKey::Page => to_value(&self.page),
            StateKey::Notifications => to_value(&self.notifications),
            StateKey::Loading => Value::Bool(self.loading),
            StateKey::Theme => to_value(&self.theme_mode),
            StateKey::Modal(id) => match self.modals.get(id) {
                Some(modal) => to_value(modal),
                None => to_value(&ModalState::default()),
            },
            StateKey::Component(id) => match self.components.get(id) {
                Some(state) => to_value(state),
                None => to_value(&ComponentState::default()),
            },
            StateKey::Custom(key) => self.custom.get(key).cloned().unwrap_or(Value::Null),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

// ── Subscriptions ──

/// One applied change.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub key: StateKey,
    pub value: Value,
    pub previous: Value,
}

type StateCallback = dyn Fn(&StateChange) + Send + Sync;

/// `None` marks a global subscriber.
type StateSubscribers = Subscribers<Option<StateKey>, StateCallback>;

struct Shared {
    tree: Mutex<StateSnapshot>,
    subscribers: Mutex<StateSubscribers>,
    bus: Arc<EventBus>,
    default_duration_ms: u64,
    max_notifications: usize,
}

/// Owner of the state tree.
#[derive(Clone)]
pub struct StateManager {
    shared: Arc<Shared>,
}

impl StateManager {
    pub fn new(bus: Arc<EventBus>, default_duration_ms: u64, max_notifications: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(StateSnapshot::default()),
                subscribers: Mutex::new(StateSubscribers::default()),
                bus,
                default_duration_ms,
                max_notifications,
            }),
        }
    }

    /// Applies `mutate` to the tree and notifies subscribers of `key` if its
    /// value changed.
    fn mutate<R>(&self, key: StateKey, mutate: impl FnOnce(&mut StateSnapshot) -> R) -> R {
        let (result, previous, value) = {
            let mut tree = lock(&self.shared.tree);
            let previous = tree.get(&key);
            let result = mutate(&mut tree);
            (result, previous, tree.get(&key))
        };
        if previous != value {
            self.notify(StateChange { key, value, previous });
        }
        result
    }

    fn notify(&self, change: StateChange) {
        let subscribers = lock(&self.shared.subscribers)
            .snapshot(|k| k.as_ref().is_none_or(|k| *k == change.key));
        debug!("state {} changed ({} subscribers)", change.key, subscribers.len());
        let label = format!("state {}", change.key);
        for callback in &subscribers {
            isolate(&label, || callback(&change));
        }
        self.shared.bus.emit(EventPayload::StateChanged {
            key: change.key.to_string(),
            value: change.value,
        });
    }

    // ── Page ──

    pub fn set_page(&self, page_id: &str, params: JsonMap) {
        let previous = self.mutate(StateKey::Page, |tree| {
            let previous = tree.page.current.take();
            tree.page = PageState {
                current: Some(page_id.to_string()),
                previous: previous.clone(),
                params: params.clone(),
            };
            previous
        });
        self.shared.bus.emit(EventPayload::PageChanged {
            page_id: page_id.to_string(),
            previous,
            params,
        });
    }

    pub fn page(&self) -> PageState {
        lock(&self.shared.tree).page.clone()
    }

    // ── Modals ──

    pub fn open_modal(&self, modal_id: &str, data: Value) {
        self.mutate(StateKey::Modal(modal_id.to_string()), |tree| {
            tree.modals.insert(modal_id.to_string(), ModalState { open: true, data });
        });
        self.shared.bus.emit(EventPayload::ModalChanged {
            modal_id: modal_id.to_string(),
            open: true,
        });
    }

    /// Returns `false` if the modal was not open.
    pub fn close_modal(&self, modal_id: &str) -> bool {
        let was_open = self.mutate(StateKey::Modal(modal_id.to_string()), |tree| {
            tree.modals.remove(modal_id).is_some_and(|m| m.open)
        });
        if was_open {
            self.shared.bus.emit(EventPayload::ModalChanged {
                modal_id: modal_id.to_string(),
                open: false,
            });
        }
        was_open
    }

    pub fn is_modal_open(&self, modal_id: &str) -> bool {
        lock(&self.shared.tree).modals.get(modal_id).is_some_and(|m| m.open)
    }

    pub fn modal_data(&self, modal_id: &str) -> Option<Value> {
        lock(&self.shared.tree).modals.get(modal_id).map(|m| m.data.clone())
    }

    // ── Notifications ──

    /// Shows a notification. With a nonzero duration it is dismissed
    /// automatically on the current tokio runtime.
    pub fn show_notification(&self, spec: NotificationSpec) -> NotificationId {
        let duration_ms = spec.duration.unwrap_or(self.shared.default_duration_ms);
        let notification = Notification {
            id: NotificationId::new(),
            kind: spec.kind,
            message: spec.message,
            title: spec.title,
            duration_ms,
            created_at: Timestamp::now(),
        };
        let id = notification.id;
        let max = self.shared.max_notifications;

        self.mutate(StateKey::Notifications, |tree| {
            tree.notifications.push(notification.clone());
            if max > 0 && tree.notifications.len() > max {
                let excess = tree.notifications.len() - max;
                tree.notifications.drain(..excess);
            }
        });
        self.shared.bus.emit(EventPayload::NotificationShown {
            notification_id: id,
            kind: notification.kind,
            message: notification.message,
        });

        if duration_ms > 0 {
            self.schedule_dismiss(id, duration_ms);
        }
        id
    }

    fn schedule_dismiss(&self, id: NotificationId, duration_ms: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; notification {} will not auto-dismiss", id);
            return;
        };
        let shared = Arc::downgrade(&self.shared);
        handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            if let Some(shared) = shared.upgrade() {
                StateManager { shared }.dismiss_notification(id);
            }
        });
    }

    /// Removes a notification. Returns `false` if it was already gone.
    pub fn dismiss_notification(&self, id: NotificationId) -> bool {
        let removed = self.mutate(StateKey::Notifications, |tree| {
            let before = tree.notifications.len();
            tree.notifications.retain(|n| n.id != id);
            tree.notifications.len() != before
        });
        if removed {
            self.shared
                .bus
                .emit(EventPayload::NotificationDismissed { notification_id: id });
        }
        removed
    }

    pub fn clear_notifications(&self) {
        self.mutate(StateKey::Notifications, |tree| tree.notifications.clear());
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.shared.tree).notifications.clone()
    }

    // ── UI flags ──

    pub fn set_loading(&self, loading: bool) {
        self.mutate(StateKey::Loading, |tree| tree.loading = loading);
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.shared.tree).loading
    }

    pub fn set_theme_mode(&self, mode: ThemeMode) {
        let changed = self.mutate(StateKey::Theme, |tree| {
            std::mem::replace(&mut tree.theme_mode, mode) != mode
        });
        if changed {
            self.shared.bus.emit(EventPayload::ThemeChanged { mode });
        }
    }

    pub fn theme_mode(&self) -> ThemeMode {
        lock(&self.shared.tree).theme_mode
    }

    // ── Components ──

    pub fn set_component_state(&self, component_id: &str, patch: ComponentStatePatch) {
        self.mutate(StateKey::Component(component_id.to_string()), |tree| {
            let state = tree.components.entry(component_id.to_string()).or_default();
            patch.apply(state);
        });
    }

    pub fn set_component_visible(&self, component_id: &str, visible: bool) {
        self.set_component_state(
            component_id,
            ComponentStatePatch {
                visible: Some(visible),
                ..Default::default()
            },
        );
    }

    pub fn set_component_disabled(&self, component_id: &str, disabled: bool) {
        self.set_component_state(
            component_id,
            ComponentStatePatch {
                disabled: Some(disabled),
                ..Default::default()
            },
        );
    }

    pub fn set_component_loading(&self, component_id: &str, loading: bool) {
        self.set_component_state(
            component_id,
            ComponentStatePatch {
                loading: Some(loading),
                ..Default::default()
            },
        );
    }

    pub fn set_component_value(&self, component_id: &str, value: Value) {
        self.set_component_state(
            component_id,
            ComponentStatePatch {
                value: Some(value),
                ..Default::default()
            },
        );
    }

    pub fn set_component_error(&self, component_id: &str, error: Option<String>) {
        self.set_component_state(
            component_id,
            ComponentStatePatch {
                error: Some(error),
                ..Default::default()
            },
        );
    }

    /// State of a component; components never touched report defaults.
    pub fn component_state(&self, component_id: &str) -> ComponentState {
        lock(&self.shared.tree)
            .components
            .get(component_id)
            .cloned()
            .unwrap_or_default()
    }

    // ── Custom keys ──

    pub fn set_custom(&self, key: &str, value: Value) {
        self.mutate(StateKey::Custom(key.to_string()), |tree| {
            tree.custom.insert(key.to_string(), value);
        });
    }

    pub fn remove_custom(&self, key: &str) -> Option<Value> {
        self.mutate(StateKey::Custom(key.to_string()), |tree| tree.custom.remove(key))
    }

    pub fn custom(&self, key: &str) -> Option<Value> {
        lock(&self.shared.tree).custom.get(key).cloned()
    }

    // ── Generic access ──

    /// Writes a key from a JSON value. `page` and `ui:notifications` have
    /// dedicated entry points and are rejected here.
    pub fn set(&self, key: &StateKey, value: Value) -> RuntimeResult<()> {
        match key {
            StateKey::Custom(name) => self.set_custom(name, value),
            StateKey::Loading => self.set_loading(weft_model::truthy(&value)),
            StateKey::Theme => self.set_theme_mode(serde_json::from_value(value)?),
            StateKey::Modal(id) => {
                let modal = match value {
                    Value::Object(_) => serde_json::from_value(value)?,
                    flag => ModalState {
                        open: weft_model::truthy(&flag),
                        data: Value::Null,
                    },
                };
                if modal.open {
                    self.open_modal(id, modal.data);
                } else {
                    self.close_modal(id);
                }
            }
            StateKey::Component(id) => {
                let state: ComponentState = serde_json::from_value(value)?;
                self.mutate(key.clone(), |tree| {
                    tree.components.insert(id.clone(), state);
                });
            }
            StateKey::Page | StateKey::Notifications => {
                return Err(RuntimeError::NotWritable(key.to_string()));
            }
        }
        Ok(())
    }

    /// Current value at `key`.
    pub fn get(&self, key: &StateKey) -> Value {
        lock(&self.shared.tree).get(key)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        lock(&self.shared.tree).clone()
    }

    /// Restores the initial tree. Subscribers stay registered and pending
    /// auto-dismiss timers become no-ops.
    pub fn reset(&self) {
        let (previous, current) = {
            let mut tree = lock(&self.shared.tree);
            let previous = std::mem::take(&mut *tree);
            (previous, tree.clone())
        };
        let mut keys = vec![
            StateKey::Page,
            StateKey::Notifications,
            StateKey::Loading,
            StateKey::Theme,
        ];
        keys.extend(previous.modals.keys().cloned().map(StateKey::Modal));
        keys.extend(previous.components.keys().cloned().map(StateKey::Component));
        keys.extend(previous.custom.keys().cloned().map(StateKey::Custom));
        for key in keys {
            let (value, prev) = (current.get(&key), previous.get(&key));
            if value != prev {
                self.notify(StateChange {
                    key,
                    value,
                    previous: prev,
                });
            }
        }
        debug!("state reset");
    }

    // ── Subscriptions ──

    /// Subscribes to one key; the callback receives `(new, previous)`.
    pub fn subscribe<F>(&self, key: StateKey, callback: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.insert(Some(key), Arc::new(move |c: &StateChange| callback(&c.value, &c.previous)))
    }

    /// Subscribes to every key.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(callback))
    }

    fn insert(&self, key: Option<StateKey>, callback: Arc<StateCallback>) -> Subscription {
        let id = lock(&self.shared.subscribers).insert(key, callback);
        let shared = Arc::downgrade(&self.shared);
        Subscription::new(id, move || {
            if let Some(shared) = shared.upgrade() {
                lock(&shared.subscribers).remove(id);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    pub fn clear_subscriptions(&self) {
        lock(&self.shared.subscribers).clear();
    }
}
