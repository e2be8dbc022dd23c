//! Flows: triggered, ordered lists of actions.
//!
//! Flows are read-only configuration owned by the schema. The action
//! executor never mutates them.

use crate::{Condition, JsonMap, NotificationSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What starts a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Trigger {
    /// A UI event (`button_click`, `form_submit`, ...), optionally scoped to
    /// one component.
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_id: Option<String>,
    },
    /// A record lifecycle event on a model.
    Record {
        model_id: String,
        lifecycle: RecordLifecycle,
    },
    /// Time-based. The runtime has no scheduler; hosts run these via
    /// `run_flow`.
    Schedule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cron: Option<String>,
    },
    /// Only started explicitly by the host.
    Manual,
}

impl Trigger {
    /// Whether this trigger fires for `event` raised by `component_id`.
    pub fn matches_event(&self, component_id: &str, event: &str) -> bool {
        match self {
            Self::Event {
                event: expected,
                component_id: scope,
            } => expected == event && scope.as_deref().is_none_or(|c| c == component_id),
            _ => false,
        }
    }

    /// Whether this trigger fires for a lifecycle event on `model_id`.
    pub fn matches_record(&self, model_id: &str, lifecycle: RecordLifecycle) -> bool {
        match self {
            Self::Record {
                model_id: expected,
                lifecycle: expected_lifecycle,
            } => expected == model_id && *expected_lifecycle == lifecycle,
            _ => false,
        }
    }
}

/// Record lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLifecycle {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for RecordLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// What happens to the rest of a flow after an action fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Run the remaining actions.
    #[default]
    Continue,
    /// Skip every remaining action.
    Stop,
}

/// A workflow step.
///
/// Required parameters default to empty: a malformed action still loads and
/// is reported as a failed step when run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Action {
    CreateRecord {
        #[serde(default)]
        model_id: String,
        /// Field values; `{{path}}` templates are interpolated. When absent
        /// the triggering form data is used.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<JsonMap>,
    },
    UpdateRecord {
        #[serde(default)]
        model_id: String,
        #[serde(default)]
        record_id: String,
        #[serde(default)]
        data: JsonMap,
    },
    DeleteRecord {
        #[serde(default)]
        model_id: String,
        #[serde(default)]
        record_id: String,
    },
    Navigate {
        #[serde(default)]
        page_id: String,
        #[serde(default)]
        params: JsonMap,
    },
    Notify {
        notification: NotificationSpec,
    },
    Wait {
        #[serde(default)]
        duration_ms: u64,
    },
    Conditional {
        condition: Condition,
        #[serde(default)]
        then: Vec<Action>,
        #[serde(default, alias = "else")]
        otherwise: Vec<Action>,
    },
    ExternalCall {
        #[serde(default)]
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<JsonMap>,
    },
    SetState {
        #[serde(default)]
        key: String,
        #[serde(default)]
        value: Value,
    },
    OpenModal {
        #[serde(default)]
        modal_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    CloseModal {
        #[serde(default)]
        modal_id: String,
    },
}

impl Action {
    /// The tag of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateRecord { .. } => ActionKind::CreateRecord,
            Self::UpdateRecord { .. } => ActionKind::UpdateRecord,
            Self::DeleteRecord { .. } => ActionKind::DeleteRecord,
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Notify { .. } => ActionKind::Notify,
            Self::Wait { .. } => ActionKind::Wait,
            Self::Conditional { .. } => ActionKind::Conditional,
            Self::ExternalCall { .. } => ActionKind::ExternalCall,
            Self::SetState { .. } => ActionKind::SetState,
            Self::OpenModal { .. } => ActionKind::OpenModal,
            Self::CloseModal { .. } => ActionKind::CloseModal,
        }
    }

    /// Model referenced by a record action.
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::CreateRecord { model_id, .. }
            | Self::UpdateRecord { model_id, .. }
            | Self::DeleteRecord { model_id, .. } => Some(model_id),
            _ => None,
        }
    }
}

/// Tag of an [`Action`], used in results and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    Navigate,
    Notify,
    Wait,
    Conditional,
    ExternalCall,
    SetState,
    OpenModal,
    CloseModal,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRecord => "create_record",
            Self::UpdateRecord => "update_record",
            Self::DeleteRecord => "delete_record",
            Self::Navigate => "navigate",
            Self::Notify => "notify",
            Self::Wait => "wait",
            Self::Conditional => "conditional",
            Self::ExternalCall => "external_call",
            Self::SetState => "set_state",
            Self::OpenModal => "open_modal",
            Self::CloseModal => "close_modal",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declarative, triggered sequence of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Flow {
    pub fn new(id: impl Into<String>, trigger: Trigger, actions: Vec<Action>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            trigger,
            actions,
            on_error: ErrorPolicy::Continue,
            enabled: true,
        }
    }
}
