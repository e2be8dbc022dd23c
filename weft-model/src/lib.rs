//! Declarative application model for Weft.
//!
//! Defines the read-only configuration the runtime consumes:
//! - [`AppSchema`]: pages, data models, flows, theme, permissions, layouts
//! - [`Record`]: one addressable unit of model data
//! - [`Condition`]: visibility/enablement and row-rule predicates
//! - [`Action`] / [`Flow`]: triggered, ordered side-effect chains
//! - [`Transform`]: pure value transforms used by bindings
//!
//! These types are produced by external tooling (schema authoring is not the
//! runtime's concern) and arrive as JSON. Keys are accepted in camelCase.

mod binding;
mod condition;
mod error;
mod flow;
mod layout;
mod notification;
mod permissions;
mod record;
mod schema;
mod style;
mod theme;
mod transform;

pub use binding::{BindingSource, BindingSpec};
pub use condition::{Condition, Operand};
pub use error::SchemaError;
pub use flow::{Action, ActionKind, ErrorPolicy, Flow, RecordLifecycle, Trigger};
pub use layout::{Breakpoint, Direction, LayoutConfig, LayoutKind, Placement};
pub use notification::{NotificationKind, NotificationSpec};
pub use permissions::{Access, AccessRule, Effect, PermissionsConfig, RuleTarget};
pub use record::Record;
pub use schema::{AppSchema, ComponentDef, DataModel, FieldDef, FieldType, Page, SchemaIssue};
pub use style::{StyleRule, StyleSpec};
pub use theme::{Theme, ThemeMode};
pub use transform::{display, truthy, Transform};

/// Free-form JSON object used for record data, props and payloads.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
