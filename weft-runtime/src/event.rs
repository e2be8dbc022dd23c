//! Runtime events.
//!
//! Every observable change in the runtime is announced as an [`Event`] on the
//! [`EventBus`](crate::EventBus). The payload is a closed enum; subscribers
//! pick the kinds they care about through [`EventKind`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_model::{ActionKind, JsonMap, NotificationKind, Record, ThemeMode};
use weft_types::{EventId, NotificationId, Timestamp};

/// An event delivered by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub emitted_at: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            emitted_at: Timestamp::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    // ── Data ──
    RecordCreated {
        model: String,
        record: Record,
    },
    RecordUpdated {
        model: String,
        record: Record,
        previous: Record,
    },
    RecordDeleted {
        model: String,
        record: Record,
    },
    RecordsReplaced {
        model: String,
        count: usize,
    },

    // ── State ──
    StateChanged {
        key: String,
        value: Value,
    },
    PageChanged {
        page_id: String,
        previous: Option<String>,
        params: JsonMap,
    },
    ModalChanged {
        modal_id: String,
        open: bool,
    },
    NotificationShown {
        notification_id: NotificationId,
        kind: NotificationKind,
        message: String,
    },
    NotificationDismissed {
        notification_id: NotificationId,
    },
    ThemeChanged {
        mode: ThemeMode,
    },
    RoleChanged {
        role: String,
        previous: String,
    },
    BindingUpdated {
        component_id: String,
        prop: String,
        value: Value,
    },

    // ── Flows ──
    FlowStarted {
        flow_id: String,
    },
    ActionExecuted {
        flow_id: String,
        index: usize,
        action: ActionKind,
        success: bool,
    },
    FlowCompleted {
        flow_id: String,
        success: bool,
        failed: usize,
    },

    // ── UI and lifecycle ──
    ComponentEvent {
        component_id: String,
        event: String,
        data: JsonMap,
    },
    AppLoaded {
        app_id: String,
    },
    AppReset,
}

/// Discriminant of [`EventPayload`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    RecordsReplaced,
    StateChanged,
    PageChanged,
    ModalChanged,
    NotificationShown,
    NotificationDismissed,
    ThemeChanged,
    RoleChanged,
    BindingUpdated,
    FlowStarted,
    ActionExecuted,
    FlowCompleted,
    ComponentEvent,
    AppLoaded,
    AppReset,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordCreated => "record_created",
            Self::RecordUpdated => "record_updated",
            Self::RecordDeleted => "record_deleted",
            Self::RecordsReplaced => "records_replaced",
            Self::StateChanged => "state_changed",
            Self::PageChanged => "page_changed",
            Self::ModalChanged => "modal_changed",
            Self::NotificationShown => "notification_shown",
            Self::NotificationDismissed => "notification_dismissed",
            Self::ThemeChanged => "theme_changed",
            Self::RoleChanged => "role_changed",
            Self::BindingUpdated => "binding_updated",
            Self::FlowStarted => "flow_started",
            Self::ActionExecuted => "action_executed",
            Self::FlowCompleted => "flow_completed",
            Self::ComponentEvent => "component_event",
            Self::AppLoaded => "app_loaded",
            Self::AppReset => "app_reset",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RecordCreated { .. } => EventKind::RecordCreated,
            Self::RecordUpdated { .. } => EventKind::RecordUpdated,
            Self::RecordDeleted { .. } => EventKind::RecordDeleted,
            Self::RecordsReplaced { .. } => EventKind::RecordsReplaced,
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::PageChanged { .. } => EventKind::PageChanged,
            Self::ModalChanged { .. } => EventKind::ModalChanged,
            Self::NotificationShown { .. } => EventKind::NotificationShown,
            Self::NotificationDismissed { .. } => EventKind::NotificationDismissed,
            Self::ThemeChanged { .. } => EventKind::ThemeChanged,
            Self::RoleChanged { .. } => EventKind::RoleChanged,
            Self::BindingUpdated { .. } => EventKind::BindingUpdated,
            Self::FlowStarted { .. } => EventKind::FlowStarted,
            Self::ActionExecuted { .. } => EventKind::ActionExecuted,
            Self::FlowCompleted { .. } => EventKind::FlowCompleted,
            Self::ComponentEvent { .. } => EventKind::ComponentEvent,
            Self::AppLoaded { .. } => EventKind::AppLoaded,
            Self::AppReset => EventKind::AppReset,
        }
    }

    /// Model id for record events.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::RecordCreated { model, .. }
            | Self::RecordUpdated { model, .. }
            | Self::RecordDeleted { model, .. }
            | Self::RecordsReplaced { model, .. } => Some(model),
            _ => None,
        }
    }
}
