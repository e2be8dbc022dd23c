//! Reactive runtime for declarative Weft applications.
//!
//! The [`RuntimeEngine`] takes an [`AppSchema`](weft_model::AppSchema) and
//! brings it to life:
//!
//! - [`EventBus`]: synchronous publish/subscribe for every runtime event
//! - [`DataStore`]: per-model record collections, notify-on-mutate
//! - [`StateManager`]: page, UI, component and custom state
//! - [`BindingEngine`]: live source → prop bindings, optionally two-way
//! - [`ConditionalRenderer`]: visibility and enablement conditions
//! - [`DynamicStyler`]: base + theme token + conditional styles
//! - [`LayoutManager`]: slot assignment with breakpoints
//! - [`PermissionsService`]: role-based access and row filtering
//! - [`ActionExecutor`]: ordered, best-effort flow execution
//!
//! All components share one [`RuntimeContext`]. Mutations notify their
//! subscribers on the caller's stack before returning; the only async work
//! is flow execution (waits, external calls) and notification auto-dismiss.

pub mod actions;
pub mod binding;
pub mod conditions;
pub mod config;
pub mod context;
pub mod data_store;
pub mod engine;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod layout;
pub mod permissions;
pub mod query;
pub mod state;
pub mod styler;
pub mod subscription;
pub mod template;
pub mod value;

pub use actions::{
    ActionContext, ActionError, ActionExecutor, ActionResult, ActionStatus, CancelToken,
    ExternalCallHandler, FlowResult, RecordMutation, TriggerInfo,
};
pub use binding::{BindingEngine, BindingTarget};
pub use conditions::{evaluate, ComponentConditions, ConditionalRenderer, Resolver};
pub use config::RuntimeConfig;
pub use context::{EvalContext, RenderScope, RuntimeContext, SchemaHandle};
pub use data_store::{DataStore, RecordSet};
pub use engine::{ActionOutcome, ComponentView, PageView, RuntimeEngine, RuntimeSnapshot};
pub use error::{RuntimeError, RuntimeResult};
pub use event::{Event, EventKind, EventPayload};
pub use event_bus::EventBus;
pub use layout::{active_breakpoint, LayoutManager, ResolvedLayout, SlotAssignment};
pub use permissions::{PermissionContext, PermissionsService};
pub use query::{Filter, Query};
pub use state::{
    ComponentState, ComponentStatePatch, ModalState, Notification, PageState, StateChange, StateKey,
    StateManager, StateSnapshot,
};
pub use styler::{ComputedStyle, DynamicStyler};
pub use subscription::{Subscription, SubscriptionId};
