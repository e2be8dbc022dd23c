//! The explicit runtime context shared by every component, and the path
//! resolver used for conditions, templates and row rules.

use crate::conditions::Resolver;
use crate::config::RuntimeConfig;
use crate::data_store::DataStore;
use crate::event_bus::EventBus;
use crate::permissions::PermissionsService;
use crate::state::{StateKey, StateManager};
use crate::subscription::lock;
use crate::value::lookup_path;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use weft_model::{AppSchema, JsonMap, Record};

/// Swappable reference to the loaded schema. Readers get an `Arc` so a swap
/// never invalidates a schema that is in use.
#[derive(Clone)]
pub struct SchemaHandle {
    current: Arc<Mutex<Arc<AppSchema>>>,
}

impl SchemaHandle {
    pub fn new(schema: AppSchema) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(schema))),
        }
    }

    pub fn current(&self) -> Arc<AppSchema> {
        Arc::clone(&lock(&self.current))
    }

    pub fn replace(&self, schema: AppSchema) -> Arc<AppSchema> {
        std::mem::replace(&mut *lock(&self.current), Arc::new(schema))
    }
}

/// Services of one running app. Cloning is cheap and shares everything.
#[derive(Clone)]
pub struct RuntimeContext {
    pub bus: Arc<EventBus>,
    pub store: Arc<DataStore>,
    pub state: StateManager,
    pub permissions: Arc<PermissionsService>,
    pub schema: SchemaHandle,
    pub config: Arc<RuntimeConfig>,
}

impl RuntimeContext {
    pub fn new(schema: AppSchema, config: RuntimeConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(DataStore::new(Arc::clone(&bus)));
        let state = StateManager::new(
            Arc::clone(&bus),
            config.default_notification_duration_ms,
            config.max_notifications,
        );
        let role = config
            .default_role
            .clone()
            .unwrap_or_else(|| schema.permissions.default_role.clone());
        let permissions = Arc::new(PermissionsService::new(schema.permissions.clone(), role));
        Self {
            bus,
            store,
            state,
            permissions,
            schema: SchemaHandle::new(schema),
            config: Arc::new(config),
        }
    }
}

/// What a particular evaluation is about: the component, record and form
/// data in scope, plus named extras (`trigger`, `last`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderScope {
    pub component_id: Option<String>,
    pub record: Option<Record>,
    pub form: JsonMap,
    pub extra: JsonMap,
}

impl RenderScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    pub fn record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn form(mut self, form: JsonMap) -> Self {
        self.form = form;
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

/// Resolves paths against live runtime data. Built fresh per evaluation,
/// so it always reads current values.
///
/// | path | resolves to |
/// |------|-------------|
/// | `record.<f>` / bare `<f>` | field of the scoped record |
/// | `form.<f>` | submitted form data |
/// | `state.<key>` | custom state key |
/// | `component.<f>` | state of the scoped component |
/// | `components.<id>.<f>` | state of any component |
/// | `page.current`, `page.params.<p>` | page state |
/// | `ui.loading`, `ui.theme`, `ui.notifications` | UI state |
/// | `modal.<id>` | whether a modal is open |
/// | `data.<model>`, `data.<model>.count` | records of a model |
/// | `user.role`, `user.id` | permission context |
pub struct EvalContext<'a> {
    ctx: &'a RuntimeContext,
    scope: &'a RenderScope,
}

impl<'a> EvalContext<'a> {
    pub fn new(ctx: &'a RuntimeContext, scope: &'a RenderScope) -> Self {
        Self { ctx, scope }
    }

    fn record_value(&self) -> Value {
        self.scope.record.as_ref().map(Record::to_value).unwrap_or(Value::Null)
    }

    fn data(&self, rest: &str) -> Value {
        let (model, tail) = split(rest);
        let records: Vec<Value> = self
            .ctx
            .store
            .get_records(model)
            .iter()
            .map(Record::to_value)
            .collect();
        match tail {
            "count" | "length" => json!(records.len()),
            _ => lookup_path(&Value::Array(records), tail),
        }
    }

    fn ui(&self) -> Value {
        json!({
            "loading": self.ctx.state.is_loading(),
            "theme": self.ctx.state.get(&StateKey::Theme),
            "notifications": self.ctx.state.get(&StateKey::Notifications),
        })
    }

    fn user(&self) -> Value {
        let context = self.ctx.permissions.context();
        json!({ "role": context.role, "id": context.user_id })
    }
}

fn split(path: &str) -> (&str, &str) {
    path.split_once('.').unwrap_or((path, ""))
}

impl Resolver for EvalContext<'_> {
    fn resolve(&self, path: &str) -> Value {
        let (head, rest) = split(path);
        match head {
            "record" => lookup_path(&self.record_value(), rest),
            "form" => lookup_path(&Value::Object(self.scope.form.clone()), rest),
            "state" => {
                let (key, tail) = split(rest);
                let value = self.ctx.state.custom(key).unwrap_or(Value::Null);
                lookup_path(&value, tail)
            }
            "component" => match &self.scope.component_id {
                Some(id) => {
                    lookup_path(&self.ctx.state.get(&StateKey::Component(id.clone())), rest)
                }
                None => Value::Null,
            },
            "components" => {
                let (id, tail) = split(rest);
                lookup_path(&self.ctx.state.get(&StateKey::Component(id.to_string())), tail)
            }
            "page" => lookup_path(&self.ctx.state.get(&StateKey::Page), rest),
            "ui" => lookup_path(&self.ui(), rest),
            "modal" => {
                let (id, _) = split(rest);
                Value::Bool(self.ctx.state.is_modal_open(id))
            }
            "data" => self.data(rest),
            "user" => lookup_path(&self.user(), rest),
            _ => match self.scope.extra.get(head) {
                Some(value) => lookup_path(value, rest),
                None => lookup_path(&self.record_value(), path),
            },
        }
    }
}
