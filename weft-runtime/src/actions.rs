//! Flow execution.
//!
//! Actions run strictly in declared order and every action gets a result,
//! whatever happened to the ones before it. The default policy is
//! continue-on-error; a flow declaring `on_error: stop` skips the rest after
//! the first failure. Side effects land immediately as each action
//! completes. There is no rollback: a flow that fails half way leaves the
//! earlier effects in place.

use crate::conditions::evaluate;
use crate::context::{EvalContext, RenderScope, RuntimeContext};
use crate::error::RuntimeError;
use crate::event::EventPayload;
use crate::state::StateKey;
use crate::subscription::lock;
use crate::template::{interpolate, interpolate_map, interpolate_str};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use weft_model::{
    Action, ActionKind, Condition, ErrorPolicy, Flow, JsonMap, NotificationSpec, Record,
    RecordLifecycle,
};

// ── Seams ──

/// Performs `external_call` actions. This is the runtime's only outward
/// integration point; transports live with the host.
#[async_trait]
pub trait ExternalCallHandler: Send + Sync {
    async fn call(&self, target: &str, payload: &JsonMap) -> Result<Value, String>;
}

/// Cooperative cancellation for a running flow. Cancelling interrupts a
/// pending wait or external call; actions not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

// ── Results ──

/// Lifecycle of one action: `Pending -> Running -> Succeeded | Failed`.
/// `Skipped` marks actions that never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Why an action failed or did not run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActionError {
    #[error("{action} is missing required parameter '{parameter}'")]
    MissingParameter { action: ActionKind, parameter: &'static str },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("record '{id}' not found in model '{model}'")]
    RecordNotFound { model: String, id: String },

    #[error("page not found: {page}")]
    PageNotFound { page: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("no external call handler for '{target}'")]
    NoExternalHandler { target: String },

    #[error("external call to '{target}' failed: {message}")]
    ExternalCall { target: String, message: String },

    #[error("{failed} nested action(s) failed")]
    BranchFailed { failed: usize },

    #[error("cancelled")]
    Cancelled,

    #[error("skipped after an earlier failure")]
    Skipped,

    #[error("{message}")]
    Failed { message: String },
}

impl From<RuntimeError> for ActionError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::ModelNotFound(model) => Self::ModelNotFound { model },
            RuntimeError::RecordNotFound { model, id } => Self::RecordNotFound { model, id },
            RuntimeError::PageNotFound(page) => Self::PageNotFound { page },
            RuntimeError::AccessDenied { .. } => Self::AccessDenied { message: e.to_string() },
            other => Self::Failed {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub index: usize,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub data: Option<Value>,
    pub error: Option<ActionError>,
    pub duration_ms: u64,
}

impl ActionResult {
    fn pending(index: usize, kind: ActionKind) -> Self {
        Self {
            index,
            kind,
            status: ActionStatus::Pending,
            data: None,
            error: None,
            duration_ms: 0,
        }
    }

    fn skipped(index: usize, kind: ActionKind, reason: ActionError) -> Self {
        Self {
            status: ActionStatus::Skipped,
            error: Some(reason),
            ..Self::pending(index, kind)
        }
    }

    pub fn success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    /// Error message, if the action failed or was skipped.
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// A record change made by a flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMutation {
    pub model: String,
    pub lifecycle: RecordLifecycle,
    pub record: Record,
}

/// Outcome of one flow run. `results` has one entry per declared action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub flow_id: String,
    pub results: Vec<ActionResult>,
    pub mutations: Vec<RecordMutation>,
    pub cancelled: bool,
    /// Cascade depth; zero for flows started directly.
    pub depth: u32,
}

impl FlowResult {
    pub fn success(&self) -> bool {
        self.results.iter().all(ActionResult::success)
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ActionStatus::Failed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ActionStatus::Skipped)
            .count()
    }
}

// ── Context ──

/// What started a flow; exposed to templates as `trigger.*`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<RecordLifecycle>,
}

impl TriggerInfo {
    pub fn event(component_id: &str, event: &str) -> Self {
        Self {
            kind: "event".into(),
            component_id: Some(component_id.to_string()),
            event: Some(event.to_string()),
            ..Self::default()
        }
    }

    pub fn record(model_id: &str, lifecycle: RecordLifecycle) -> Self {
        Self {
            kind: "record".into(),
            model_id: Some(model_id.to_string()),
            lifecycle: Some(lifecycle),
            ..Self::default()
        }
    }

    pub fn manual() -> Self {
        Self {
            kind: "manual".into(),
            ..Self::default()
        }
    }
}

/// Mutable context threaded through one flow run.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub trigger: TriggerInfo,
    /// Submitted form data (`form.*`).
    pub form: JsonMap,
    /// Record the flow is about (`record.*`), for record triggers.
    pub record: Option<Record>,
    /// Data returned by the previous action (`last.*`).
    pub last: Value,
    pub cancel: CancelToken,
    pub depth: u32,
    mutations: Vec<RecordMutation>,
}

impl ActionContext {
    pub fn new(trigger: TriggerInfo) -> Self {
        Self {
            trigger,
            ..Self::default()
        }
    }

    pub fn with_form(mut self, form: JsonMap) -> Self {
        self.form = form;
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    fn scope(&self, flow_id: &str) -> RenderScope {
        RenderScope {
            component_id: self.trigger.component_id.clone(),
            record: self.record.clone(),
            form: self.form.clone(),
            extra: JsonMap::new(),
        }
        .with("trigger", serde_json::to_value(&self.trigger).unwrap_or_default())
        .with("last", self.last.clone())
        .with("flow", json!({ "id": flow_id }))
    }
}

/// Data and error of one finished step. A conditional can carry both.
struct StepOutcome {
    data: Option<Value>,
    error: Option<ActionError>,
}

impl From<Result<Value, ActionError>> for StepOutcome {
    fn from(result: Result<Value, ActionError>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(data),
                error: None,
            },
            Err(error) => Self { data: None, error: Some(error) },
        }
    }
}

fn required<'a>(
    action: ActionKind,
    parameter: &'static str,
    value: &'a str,
) -> Result<&'a str, ActionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ActionError::MissingParameter { action, parameter });
    }
    Ok(value)
}

// ── Executor ──

/// Runs flows against the runtime context.
pub struct ActionExecutor {
    ctx: RuntimeContext,
    external: Mutex<Option<Arc<dyn ExternalCallHandler>>>,
}

impl ActionExecutor {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            external: Mutex::new(None),
        }
    }

    pub fn set_external_handler(&self, handler: Arc<dyn ExternalCallHandler>) {
        *lock(&self.external) = Some(handler);
    }

    pub fn clear_external_handler(&self) {
        *lock(&self.external) = None;
    }

    /// Runs every action of `flow` in order.
    pub async fn execute_flow(&self, flow: &Flow, ctx: &mut ActionContext) -> FlowResult {
        info!("running flow {} ({} actions)", flow.id, flow.actions.len());
        self.ctx.bus.emit(EventPayload::FlowStarted {
            flow_id: flow.id.clone(),
        });

        let mut results = Vec::with_capacity(flow.actions.len());
        let mut halted = false;
        for (index, action) in flow.actions.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                results.push(ActionResult::skipped(index, action.kind(), ActionError::Cancelled));
                continue;
            }
            if halted {
                results.push(ActionResult::skipped(index, action.kind(), ActionError::Skipped));
                continue;
            }

            let result = self.run_action(&flow.id, index, action, ctx).await;
            self.ctx.bus.emit(EventPayload::ActionExecuted {
                flow_id: flow.id.clone(),
                index,
                action: result.kind,
                success: result.success(),
            });
            if !result.success() && flow.on_error == ErrorPolicy::Stop {
                halted = true;
            }
            results.push(result);
        }

        let result = FlowResult {
            flow_id: flow.id.clone(),
            results,
            mutations: std::mem::take(&mut ctx.mutations),
            cancelled: ctx.cancel.is_cancelled(),
            depth: ctx.depth,
        };
        let failed = result.failed();
        if failed > 0 {
            warn!("flow {} finished with {} failed action(s)", flow.id, failed);
        } else {
            debug!("flow {} finished", flow.id);
        }
        self.ctx.bus.emit(EventPayload::FlowCompleted {
            flow_id: flow.id.clone(),
            success: result.success(),
            failed,
        });
        result
    }

    /// Runs a single action outside of a flow.
    pub async fn execute_action(&self, action: &Action, ctx: &mut ActionContext) -> ActionResult {
        self.run_action("", 0, action, ctx).await
    }

    async fn run_action(
        &self,
        flow_id: &str,
        index: usize,
        action: &Action,
        ctx: &mut ActionContext,
    ) -> ActionResult {
        let mut result = ActionResult::pending(index, action.kind());
        result.status = ActionStatus::Running;
        debug!("flow {}: action {} ({}) running", flow_id, index, result.kind);
        let started = Instant::now();

        let outcome = match action {
            Action::Conditional {
                condition,
                then,
                otherwise,
            } => self.run_branch(flow_id, condition, then, otherwise, ctx).await,
            other => self.perform(flow_id, other, ctx).await.into(),
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        result.data = outcome.data;
        match outcome.error {
            Some(error) => {
                warn!("flow {}: action {} ({}) failed: {}", flow_id, index, result.kind, error);
                result.status = ActionStatus::Failed;
                result.error = Some(error);
            }
            None => {
                result.status = ActionStatus::Succeeded;
                ctx.last = result.data.clone().unwrap_or(Value::Null);
            }
        }
        result
    }

    /// Runs the chosen branch of a conditional. Nested actions always
    /// continue on error; their results are reported in the step data.
    fn run_branch<'a>(
        &'a self,
        flow_id: &'a str,
        condition: &'a Condition,
        then: &'a [Action],
        otherwise: &'a [Action],
        ctx: &'a mut ActionContext,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let take_then = {
                let scope = ctx.scope(flow_id);
                evaluate(condition, &EvalContext::new(&self.ctx, &scope))
            };
            let branch = if take_then { then } else { otherwise };

            let mut results = Vec::with_capacity(branch.len());
            for (index, action) in branch.iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    let (kind, error) = (action.kind(), ActionError::Cancelled);
                    results.push(ActionResult::skipped(index, kind, error));
                    continue;
                }
                results.push(self.run_action(flow_id, index, action, ctx).await);
            }

            let failed = results.iter().filter(|r| r.status == ActionStatus::Failed).count();
            StepOutcome {
                data: Some(json!({
                    "branch": if take_then { "then" } else { "else" },
                    "results": serde_json::to_value(&results).unwrap_or_default(),
                })),
                error: (failed > 0).then_some(ActionError::BranchFailed { failed }),
            }
        })
    }

    async fn perform(
        &self,
        flow_id: &str,
        action: &Action,
        ctx: &mut ActionContext,
    ) -> Result<Value, ActionError> {
        let kind = action.kind();
        let scope = ctx.scope(flow_id);
        let text = |s: &str| interpolate_str(s, &EvalContext::new(&self.ctx, &scope));
        let map = |m: &JsonMap| interpolate_map(m, &EvalContext::new(&self.ctx, &scope));

        match action {
            Action::CreateRecord { model_id, data } => {
                let model = required(kind, "modelId", model_id)?;
                let data = match data {
                    Some(data) => map(data),
                    None => ctx.form.clone(),
                };
                let record = self.ctx.store.create_record(model, data)?;
                let value = record.to_value();
                ctx.mutations.push(RecordMutation {
                    model: model.to_string(),
                    lifecycle: RecordLifecycle::Created,
                    record,
                });
                Ok(value)
            }
            Action::UpdateRecord {
                model_id,
                record_id,
                data,
            } => {
                let model = required(kind, "modelId", model_id)?;
                let id = text(required(kind, "recordId", record_id)?);
                let id = required(kind, "recordId", &id)?;
                if data.is_empty() {
                    return Err(ActionError::MissingParameter { action: kind, parameter: "data" });
                }
                let record = self.ctx.store.update_record(model, id, map(data))?;
                let value = record.to_value();
                ctx.mutations.push(RecordMutation {
                    model: model.to_string(),
                    lifecycle: RecordLifecycle::Updated,
                    record,
                });
                Ok(value)
            }
            Action::DeleteRecord { model_id, record_id } => {
                let model = required(kind, "modelId", model_id)?;
                let id = text(required(kind, "recordId", record_id)?);
                let id = required(kind, "recordId", &id)?;
                let record = self.ctx.store.delete_record(model, id)?;
                let value = record.to_value();
                ctx.mutations.push(RecordMutation {
                    model: model.to_string(),
                    lifecycle: RecordLifecycle::Deleted,
                    record,
                });
                Ok(value)
            }
            Action::Navigate { page_id, params } => {
                let page = text(required(kind, "pageId", page_id)?);
                let page = required(kind, "pageId", &page)?;
                if self.ctx.schema.current().page(page).is_none() {
                    return Err(ActionError::PageNotFound { page: page.to_string() });
                }
                if !self.ctx.permissions.can_view_page(page) {
                    let role = self.ctx.permissions.role();
                    return Err(ActionError::AccessDenied {
                        message: format!("role '{role}' cannot view page '{page}'"),
                    });
                }
                self.ctx.state.set_page(page, map(params));
                Ok(json!({ "pageId": page }))
            }
            Action::Notify { notification } => {
                let message = text(&notification.message);
                if message.trim().is_empty() {
                    return Err(ActionError::MissingParameter {
                        action: kind,
                        parameter: "message",
                    });
                }
                let spec = NotificationSpec {
                    kind: notification.kind,
                    message,
                    title: notification.title.as_deref().map(text),
                    duration: notification.duration,
                };
                let id = self.ctx.state.show_notification(spec);
                Ok(json!({ "notificationId": id.to_string() }))
            }
            Action::Wait { duration_ms } => {
                if *duration_ms == 0 {
                    return Ok(json!({ "waitedMs": 0 }));
                }
                let cancel = ctx.cancel.clone();
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*duration_ms)) => {
                        Ok(json!({ "waitedMs": duration_ms }))
                    }
                    _ = cancel.cancelled() => Err(ActionError::Cancelled),
                }
            }
            Action::ExternalCall { target, payload } => {
                let target = text(required(kind, "target", target)?);
                let target = required(kind, "target", &target)?.to_string();
                let payload = match payload {
                    Some(payload) => map(payload),
                    None => {
                        return Err(ActionError::MissingParameter {
                            action: kind,
                            parameter: "payload",
                        });
                    }
                };
                let handler = lock(&self.external).clone();
                let Some(handler) = handler else {
                    return Err(ActionError::NoExternalHandler { target });
                };
                let cancel = ctx.cancel.clone();
                tokio::select! {
                    result = handler.call(&target, &payload) => {
                        result.map_err(|message| ActionError::ExternalCall {
                            target: target.clone(),
                            message,
                        })
                    }
                    _ = cancel.cancelled() => Err(ActionError::Cancelled),
                }
            }
            Action::SetState { key, value } => {
                let key: StateKey = required(kind, "key", key)?.parse()?;
                let value = interpolate(value, &EvalContext::new(&self.ctx, &scope));
                self.ctx.state.set(&key, value.clone())?;
                Ok(json!({ "key": key.to_string(), "value": value }))
            }
            Action::OpenModal { modal_id, data } => {
                let modal = required(kind, "modalId", modal_id)?;
                let data = data
                    .as_ref()
                    .map(|d| interpolate(d, &EvalContext::new(&self.ctx, &scope)))
                    .unwrap_or(Value::Null);
                self.ctx.state.open_modal(modal, data);
                Ok(json!({ "modalId": modal }))
            }
            Action::CloseModal { modal_id } => {
                let modal = required(kind, "modalId", modal_id)?;
                let was_open = self.ctx.state.close_modal(modal);
                Ok(json!({ "modalId": modal, "wasOpen": was_open }))
            }
            Action::Conditional { .. } => Err(ActionError::Failed {
                message: "conditional dispatched as a simple action".to_string(),
            }),
        }
    }
}
