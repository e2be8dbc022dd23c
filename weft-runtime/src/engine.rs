//! The runtime engine: owns one app's components and wires them to the
//! loaded schema.

use crate::actions::{
    ActionContext, ActionExecutor, CancelToken, ExternalCallHandler, FlowResult, RecordMutation,
    TriggerInfo,
};
use crate::binding::BindingEngine;
use crate::conditions::{ComponentConditions, ConditionalRenderer};
use crate::config::RuntimeConfig;
use crate::context::{EvalContext, RenderScope, RuntimeContext};
use crate::data_store::{DataStore, RecordSet};
use crate::error::{RuntimeError, RuntimeResult};
use crate::event::{Event, EventKind, EventPayload};
use crate::event_bus::EventBus;
use crate::layout::{LayoutManager, ResolvedLayout, SlotAssignment};
use crate::permissions::{PermissionContext, PermissionsService};
use crate::query::Query;
use crate::state::{PageState, StateKey, StateManager, StateSnapshot};
use crate::styler::{ComputedStyle, DynamicStyler};
use crate::subscription::{lock, Subscription};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};
use weft_model::{AppSchema, JsonMap, LayoutConfig, Record, Theme, ThemeMode};

/// Flows run for one component event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Results of matched flows, followed by any record-triggered flows they
    /// cascaded into.
    pub flows: Vec<FlowResult>,
    /// Matched flows the current role may not run.
    pub denied: Vec<String>,
}

impl ActionOutcome {
    pub fn success(&self) -> bool {
        self.denied.is_empty() && self.flows.iter().all(FlowResult::success)
    }

    pub fn flow(&self, flow_id: &str) -> Option<&FlowResult> {
        self.flows.iter().find(|f| f.flow_id == flow_id)
    }
}

/// Point-in-time view of the running app.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub app_id: String,
    pub page: PageState,
    pub data: BTreeMap<String, Vec<Record>>,
    pub theme: Theme,
    pub state: StateSnapshot,
    pub permissions: PermissionContext,
}

/// A component ready to paint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentView {
    pub id: String,
    pub kind: String,
    pub visible: bool,
    pub disabled: bool,
    pub style: ComputedStyle,
    /// Static props overlaid with bound values.
    pub props: JsonMap,
    pub slot: Option<SlotAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page_id: String,
    pub name: String,
    pub layout: ResolvedLayout,
    pub components: Vec<ComponentView>,
}

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    listeners: Vec<Subscription>,
}

/// One running app.
///
/// Every component shares the same [`RuntimeContext`]; there are no global
/// singletons, so several engines can live side by side.
pub struct RuntimeEngine {
    ctx: RuntimeContext,
    bindings: BindingEngine,
    conditions: ConditionalRenderer,
    styler: DynamicStyler,
    layout: LayoutManager,
    executor: ActionExecutor,
    lifecycle: Mutex<Lifecycle>,
}

impl RuntimeEngine {
    /// Validates the schema and builds the runtime. Nothing is loaded until
    /// [`initialize`](Self::initialize).
    pub fn new(schema: AppSchema, config: RuntimeConfig) -> RuntimeResult<Self> {
        schema.validate()?;
        let theme = schema.theme.clone();
        let ctx = RuntimeContext::new(schema, config);
        Ok(Self {
            bindings: BindingEngine::new(ctx.clone()),
            conditions: ConditionalRenderer::new(ctx.clone()),
            styler: DynamicStyler::new(theme),
            layout: LayoutManager::new(),
            executor: ActionExecutor::new(ctx.clone()),
            lifecycle: Mutex::new(Lifecycle::default()),
            ctx,
        })
    }

    // ── Accessors ──

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn schema(&self) -> Arc<AppSchema> {
        self.ctx.schema.current()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.ctx.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn store(&self) -> &DataStore {
        &self.ctx.store
    }

    pub fn state(&self) -> &StateManager {
        &self.ctx.state
    }

    pub fn permissions(&self) -> &PermissionsService {
        &self.ctx.permissions
    }

    pub fn bindings(&self) -> &BindingEngine {
        &self.bindings
    }

    pub fn conditions(&self) -> &ConditionalRenderer {
        &self.conditions
    }

    pub fn styler(&self) -> &DynamicStyler {
        &self.styler
    }

    pub fn layout(&self) -> &LayoutManager {
        &self.layout
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn set_external_handler(&self, handler: Arc<dyn ExternalCallHandler>) {
        self.executor.set_external_handler(handler);
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.lifecycle).initialized
    }

    // ── Lifecycle ──

    /// Loads the schema into the runtime. Calling it again is a no-op.
    pub fn initialize(&self) -> RuntimeResult<()> {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.initialized {
                debug!("runtime already initialized");
                return Ok(());
            }
            lifecycle.initialized = true;
        }
        if let Err(e) = self.load() {
            lock(&self.lifecycle).initialized = false;
            return Err(e);
        }
        Ok(())
    }

    fn load(&self) -> RuntimeResult<()> {
        let schema = self.ctx.schema.current();
        info!(
            "initializing app '{}' ({} pages, {} models)",
            schema.id,
            schema.pages.len(),
            schema.data_models.len()
        );
        for issue in schema.lint() {
            warn!("schema: {}", issue);
        }

        self.ctx.store.register_models(&schema.data_models);
        for (model, rows) in &schema.seed {
            let records = rows
                .iter()
                .map(|row| self.ctx.store.build_record(model, row.clone()))
                .collect::<RuntimeResult<Vec<_>>>()?;
            self.ctx.store.set_records(model, records)?;
        }

        self.ctx.permissions.set_config(schema.permissions.clone());
        let role = self
            .ctx
            .config
            .default_role
            .clone()
            .unwrap_or_else(|| schema.permissions.default_role.clone());
        let previous = self.ctx.permissions.context();
        self.ctx.permissions.update_context(PermissionContext { role, ..previous });

        self.styler.set_theme(schema.theme.clone());
        self.ctx.state.set_theme_mode(schema.theme.mode);

        for (section, config) in &schema.layouts {
            self.layout.register(section, config.clone());
        }
        for page in &schema.pages {
            self.layout.register(&page.id, page.layout.clone().unwrap_or_default());
            for component in &page.components {
                self.conditions.register(&component.id, ComponentConditions::from(component));
                if let Some(style) = &component.style {
                    self.styler.register(&component.id, style.clone());
                }
                for binding in &component.bindings {
                    if let Err(e) = self.bindings.register(&component.id, binding.clone(), None) {
                        warn!("binding {}.{} not registered: {}", component.id, binding.prop, e);
                    }
                }
            }
        }

        let tracer = self.ctx.bus.on_any(|event: &Event| {
            trace!(kind = %event.kind(), id = %event.id, "event");
        });
        lock(&self.lifecycle).listeners.push(tracer);

        if let Some(home) = schema.home_page_id()
            && let Err(e) = self.navigate_to(home, JsonMap::new())
        {
            warn!("home page '{}' not opened: {}", home, e);
        }
        self.ctx.bus.emit(EventPayload::AppLoaded { app_id: schema.id.clone() });
        Ok(())
    }

    /// Releases bindings and bus subscriptions. Data and state are kept.
    pub fn destroy(&self) {
        let listeners = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.initialized = false;
            std::mem::take(&mut lifecycle.listeners)
        };
        for listener in &listeners {
            listener.unsubscribe();
        }
        self.bindings.clear();
        self.ctx.bus.clear();
        info!("runtime destroyed");
    }

    /// Clears every subscription, record, piece of state and registration.
    /// The engine must be initialized again before use.
    pub fn reset_all(&self) {
        self.ctx.bus.emit(EventPayload::AppReset);
        self.destroy();
        self.ctx.store.clear();
        self.ctx.state.clear_subscriptions();
        self.ctx.state.reset();
        self.conditions.clear();
        self.styler.clear();
        self.layout.clear();
        info!("runtime reset");
    }

    /// Swaps in a new schema: full reset, then initialize.
    pub fn update_app(&self, schema: AppSchema) -> RuntimeResult<()> {
        schema.validate()?;
        info!("switching app to '{}'", schema.id);
        self.reset_all();
        self.ctx.schema.replace(schema);
        self.initialize()
    }

    // ── Navigation ──

    pub fn navigate_to(&self, page_id: &str, params: JsonMap) -> RuntimeResult<()> {
        if self.ctx.schema.current().page(page_id).is_none() {
            return Err(RuntimeError::PageNotFound(page_id.to_string()));
        }
        if !self.ctx.permissions.can_view_page(page_id) {
            return Err(RuntimeError::AccessDenied {
                role: self.ctx.permissions.role(),
                operation: format!("view page '{page_id}'"),
            });
        }
        info!("navigating to {}", page_id);
        self.ctx.state.set_page(page_id, params);
        Ok(())
    }

    // ── Flows ──

    /// Runs every enabled flow triggered by `event_type` on `component_id`,
    /// then the record-lifecycle flows their mutations trigger.
    pub async fn handle_action(
        &self,
        component_id: &str,
        event_type: &str,
        form_data: JsonMap,
    ) -> ActionOutcome {
        self.handle_action_with_cancel(component_id, event_type, form_data, CancelToken::new())
            .await
    }

    pub async fn handle_action_with_cancel(
        &self,
        component_id: &str,
        event_type: &str,
        form_data: JsonMap,
        cancel: CancelToken,
    ) -> ActionOutcome {
        self.ctx.bus.emit(EventPayload::ComponentEvent {
            component_id: component_id.to_string(),
            event: event_type.to_string(),
            data: form_data.clone(),
        });

        let schema = self.ctx.schema.current();
        let mut outcome = ActionOutcome::default();
        for flow in schema
            .flows
            .iter()
            .filter(|f| f.enabled && f.trigger.matches_event(component_id, event_type))
        {
            if !self.ctx.permissions.can_perform_action(&flow.id) {
                warn!("role '{}' may not run flow {}", self.ctx.permissions.role(), flow.id);
                outcome.denied.push(flow.id.clone());
                continue;
            }
            let mut ctx = ActionContext::new(TriggerInfo::event(component_id, event_type))
                .with_form(form_data.clone())
                .with_cancel(cancel.clone());
            let result = self.executor.execute_flow(flow, &mut ctx).await;
            let mutations = result.mutations.clone();
            outcome.flows.push(result);
            outcome.flows.extend(self.cascade(mutations, 1, cancel.clone()).await);
        }
        if outcome.flows.is_empty() && outcome.denied.is_empty() {
            debug!("no flow for {} on {}", event_type, component_id);
        }
        outcome
    }

    /// Runs record-lifecycle flows for `mutations`, recursing into the
    /// mutations those flows make until `max_trigger_depth`.
    fn cascade(
        &self,
        mutations: Vec<RecordMutation>,
        depth: u32,
        cancel: CancelToken,
    ) -> BoxFuture<'_, Vec<FlowResult>> {
        Box::pin(async move {
            let mut results = Vec::new();
            if mutations.is_empty() {
                return results;
            }
            if depth > self.ctx.config.max_trigger_depth {
                warn!("record trigger cascade stopped at depth {}", depth);
                return results;
            }
            let schema = self.ctx.schema.current();
            for mutation in mutations {
                let triggered = schema.flows.iter().filter(|f| {
                    f.enabled && f.trigger.matches_record(&mutation.model, mutation.lifecycle)
                });
                for flow in triggered {
                    if !self.ctx.permissions.can_perform_action(&flow.id) {
                        continue;
                    }
                    let trigger = TriggerInfo::record(&mutation.model, mutation.lifecycle);
                    let mut ctx = ActionContext::new(trigger)
                        .with_record(mutation.record.clone())
                        .with_cancel(cancel.clone())
                        .at_depth(depth);
                    let result = self.executor.execute_flow(flow, &mut ctx).await;
                    let nested = result.mutations.clone();
                    results.push(result);
                    results.extend(self.cascade(nested, depth + 1, cancel.clone()).await);
                }
            }
            results
        })
    }

    /// Runs one flow by id regardless of its trigger, followed by any
    /// record-triggered flows its mutations cascade into. Hosts use this for
    /// schedule and manual flows.
    pub async fn run_flow(
        &self,
        flow_id: &str,
        form_data: JsonMap,
    ) -> RuntimeResult<ActionOutcome> {
        let schema = self.ctx.schema.current();
        let flow = schema
            .flow(flow_id)
            .ok_or_else(|| RuntimeError::FlowNotFound(flow_id.to_string()))?;
        if !self.ctx.permissions.can_perform_action(flow_id) {
            return Err(RuntimeError::AccessDenied {
                role: self.ctx.permissions.role(),
                operation: format!("run flow '{flow_id}'"),
            });
        }
        let cancel = CancelToken::new();
        let mut ctx = ActionContext::new(TriggerInfo::manual())
            .with_form(form_data)
            .with_cancel(cancel.clone());
        let result = self.executor.execute_flow(flow, &mut ctx).await;
        let mutations = result.mutations.clone();
        let mut outcome = ActionOutcome::default();
        outcome.flows.push(result);
        outcome.flows.extend(self.cascade(mutations, 1, cancel).await);
        Ok(outcome)
    }

    // ── Data ──

    pub fn get_records(&self, model: &str) -> Vec<Record> {
        self.ctx.store.get_records(model)
    }

    pub fn get_record(&self, model: &str, id: &str) -> Option<Record> {
        self.ctx.store.get_record(model, id)
    }

    pub fn query(&self, model: &str, query: &Query) -> Vec<Record> {
        self.ctx.store.query(model, query)
    }

    pub fn create_record(&self, model: &str, data: JsonMap) -> RuntimeResult<Record> {
        self.ctx.store.create_record(model, data)
    }

    pub fn update_record(&self, model: &str, id: &str, changes: JsonMap) -> RuntimeResult<Record> {
        self.ctx.store.update_record(model, id, changes)
    }

    pub fn delete_record(&self, model: &str, id: &str) -> RuntimeResult<Record> {
        self.ctx.store.delete_record(model, id)
    }

    /// Records of `model` the current role may see.
    pub fn visible_records(&self, model: &str) -> Vec<Record> {
        self.ctx.permissions.filter_rows(model, self.ctx.store.get_records(model))
    }

    // ── Subscriptions ──

    pub fn subscribe_to_model<F>(&self, model: &str, callback: F) -> Subscription
    where
        F: Fn(&RecordSet) + Send + Sync + 'static,
    {
        self.ctx.store.subscribe(model, callback)
    }

    pub fn subscribe_to_state<F>(&self, key: StateKey, callback: F) -> Subscription
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.ctx.state.subscribe(key, callback)
    }

    pub fn on_event<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.ctx.bus.on(kind, handler)
    }

    // ── Context ──

    /// Switches role. The permission context is replaced before this
    /// returns, so every later query sees the new role.
    pub fn set_current_role(&self, role: &str, user_id: Option<String>) -> String {
        let previous = self.ctx.permissions.update_context(PermissionContext {
            role: role.to_string(),
            user_id,
        });
        self.ctx.bus.emit(EventPayload::RoleChanged {
            role: role.to_string(),
            previous: previous.role.clone(),
        });
        previous.role
    }

    pub fn set_theme(&self, theme: Theme) {
        let mode = theme.mode;
        self.styler.set_theme(theme);
        self.ctx.state.set_theme_mode(mode);
    }

    pub fn set_theme_mode(&self, mode: ThemeMode) {
        self.ctx.state.set_theme_mode(mode);
    }

    pub fn get_context(&self) -> RuntimeSnapshot {
        let state = self.ctx.state.snapshot();
        RuntimeSnapshot {
            app_id: self.ctx.schema.current().id.clone(),
            page: state.page.clone(),
            data: self.ctx.store.snapshot(),
            theme: self.styler.theme(),
            state,
            permissions: self.ctx.permissions.context(),
        }
    }

    // ── Rendering ──

    /// Computes what a page looks like right now.
    pub fn render_page(&self, page_id: &str) -> RuntimeResult<PageView> {
        let schema = self.ctx.schema.current();
        let page = schema
            .page(page_id)
            .ok_or_else(|| RuntimeError::PageNotFound(page_id.to_string()))?;
        if !self.ctx.permissions.can_view_page(page_id) {
            return Err(RuntimeError::AccessDenied {
                role: self.ctx.permissions.role(),
                operation: format!("view page '{page_id}'"),
            });
        }
        if self.layout.config(page_id).is_none() {
            self.layout
                .register(page_id, page.layout.clone().unwrap_or_else(LayoutConfig::default));
        }

        let ids: Vec<&str> = page.components.iter().map(|c| c.id.as_str()).collect();
        let layout = self.layout.resolve(page_id, &ids, self.ctx.config.viewport_width)?;
        let mode = self.ctx.state.theme_mode();

        let components = page
            .components
            .iter()
            .map(|component| {
                let scope = RenderScope::new().component(component.id.clone());
                let resolver = EvalContext::new(&self.ctx, &scope);
                let mut props = component.props.clone();
                props.extend(self.bindings.props(&component.id));
                ComponentView {
                    id: component.id.clone(),
                    kind: component.kind.clone(),
                    visible: self.conditions.should_show(&component.id, &scope),
                    disabled: self.conditions.should_disable(&component.id, &scope),
                    style: self.styler.resolve(&component.id, &resolver, mode),
                    props,
                    slot: layout.slot_of(&component.id).cloned(),
                }
            })
            .collect();

        Ok(PageView {
            page_id: page.id.clone(),
            name: page.name.clone(),
            layout,
            components,
        })
    }

    /// Target-side write through a two-way binding.
    pub fn write_binding(&self, component_id: &str, prop: &str, value: Value) -> RuntimeResult<()> {
        self.bindings.write_back(component_id, prop, value)
    }
}
