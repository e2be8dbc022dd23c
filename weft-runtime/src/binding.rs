//! Live links from record fields, collections and state keys to component
//! props.

use crate::context::RuntimeContext;
use crate::data_store::RecordSet;
use crate::error::{RuntimeError, RuntimeResult};
use crate::event::EventPayload;
use crate::state::StateKey;
use crate::subscription::{isolate, lock, Subscription};
use crate::value::{lookup_path, set_path};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use weft_model::{BindingSource, BindingSpec, JsonMap, Record, Transform};

/// Receives every new value of a bound prop.
pub type BindingTarget = dyn Fn(&Value) + Send + Sync;

type BindingKey = (String, String);
type PropTable = HashMap<BindingKey, Value>;

/// Write side of one binding, shared with its source subscription.
struct Sink {
    component_id: String,
    prop: String,
    transform: Vec<Transform>,
    target: Option<Arc<BindingTarget>>,
    last: Mutex<Option<Value>>,
    active: AtomicBool,
    props: Arc<Mutex<PropTable>>,
    ctx: RuntimeContext,
}

impl Sink {
    /// Transforms a raw source value and forwards it unless it equals the
    /// last value written.
    fn push(&self, raw: &Value) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let value = Transform::apply_all(&self.transform, raw);
        {
            let mut last = lock(&self.last);
            if last.as_ref() == Some(&value) {
                return;
            }
            *last = Some(value.clone());
        }
        lock(&self.props).insert((self.component_id.clone(), self.prop.clone()), value.clone());
        if let Some(target) = &self.target {
            let label = format!("binding {}.{}", self.component_id, self.prop);
            isolate(&label, || target(&value));
        }
        self.ctx.bus.emit(EventPayload::BindingUpdated {
            component_id: self.component_id.clone(),
            prop: self.prop.clone(),
            value,
        });
    }
}

struct ActiveBinding {
    spec: BindingSpec,
    sink: Arc<Sink>,
    subscription: Subscription,
}

impl ActiveBinding {
    fn release(&self) {
        self.sink.active.store(false, Ordering::SeqCst);
        self.subscription.unsubscribe();
    }
}

/// Resolves a field or collection source against a record list.
fn from_records(source: &BindingSource, records: &[Record]) -> Value {
    match source {
        BindingSource::Field { record_id, field, .. } => {
            let record = match record_id {
                Some(id) => records.iter().find(|r| r.id.as_str() == id),
                None => records.first(),
            };
            record.map(|r| r.field_value(field)).unwrap_or(Value::Null)
        }
        BindingSource::Collection { .. } => {
            Value::Array(records.iter().map(Record::to_value).collect())
        }
        BindingSource::State { .. } => Value::Null,
    }
}

/// Maintains the active bindings of the running app. At most one binding
/// exists per (component, prop).
pub struct BindingEngine {
    ctx: RuntimeContext,
    bindings: Mutex<HashMap<BindingKey, ActiveBinding>>,
    props: Arc<Mutex<PropTable>>,
}

impl BindingEngine {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            bindings: Mutex::new(HashMap::new()),
            props: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a binding, writing the current source value to `target`
    /// before returning. A binding already registered for the same
    /// (component, prop) is released first.
    pub fn register(
        &self,
        component_id: &str,
        spec: BindingSpec,
        target: Option<Arc<BindingTarget>>,
    ) -> RuntimeResult<()> {
        let key = (component_id.to_string(), spec.prop.clone());
        let state_key = match &spec.source {
            BindingSource::State { key, .. } => Some(key.parse::<StateKey>()?),
            _ => None,
        };

        if let Some(previous) = lock(&self.bindings).remove(&key) {
            debug!("superseding binding {}.{}", component_id, spec.prop);
            previous.release();
        }

        let sink = Arc::new(Sink {
            component_id: component_id.to_string(),
            prop: spec.prop.clone(),
            transform: spec.transform.clone(),
            target,
            last: Mutex::new(None),
            active: AtomicBool::new(true),
            props: Arc::clone(&self.props),
            ctx: self.ctx.clone(),
        });

        let subscription = match (state_key, &spec.source) {
            (Some(state_key), BindingSource::State { path, .. }) => {
                let path = path.clone().unwrap_or_default();
                sink.push(&lookup_path(&self.ctx.state.get(&state_key), &path));
                let writer = Arc::clone(&sink);
                self.ctx
                    .state
                    .subscribe(state_key, move |value, _| writer.push(&lookup_path(value, &path)))
            }
            (_, BindingSource::Field { model_id, .. } | BindingSource::Collection { model_id }) => {
                let source = spec.source.clone();
                sink.push(&from_records(&source, &self.ctx.store.get_records(model_id)));
                let writer = Arc::clone(&sink);
                self.ctx.store.subscribe(model_id, move |set: &RecordSet| {
                    writer.push(&from_records(&source, &set.records))
                })
            }
            (None, BindingSource::State { key, .. }) => {
                return Err(RuntimeError::InvalidStateKey(key.clone()));
            }
        };

        let replaced = lock(&self.bindings).insert(
            key,
            ActiveBinding {
                spec,
                sink,
                subscription,
            },
        );
        // A target callback may have registered the same pair re-entrantly.
        if let Some(replaced) = replaced {
            replaced.release();
        }
        Ok(())
    }

    /// Pushes a target-side value back to the binding's source. Only two-way
    /// bindings accept writes; the transform pipeline is inverted when
    /// possible, otherwise the raw value is written.
    pub fn write_back(&self, component_id: &str, prop: &str, value: Value) -> RuntimeResult<()> {
        let spec = lock(&self.bindings)
            .get(&(component_id.to_string(), prop.to_string()))
            .map(|b| b.spec.clone())
            .ok_or_else(|| RuntimeError::BindingNotFound {
                component_id: component_id.to_string(),
                prop: prop.to_string(),
            })?;
        if !spec.two_way {
            return Err(RuntimeError::NotWritable(format!("{component_id}.{prop} is one-way")));
        }

        let source_value = Transform::invert_all(&spec.transform, &value);
        match &spec.source {
            BindingSource::Field {
                model_id,
                record_id,
                field,
            } => {
                let record_id = match record_id {
                    Some(id) => id.clone(),
                    None => self
                        .ctx
                        .store
                        .get_records(model_id)
                        .first()
                        .map(|r| r.id.to_string())
                        .ok_or_else(|| RuntimeError::RecordNotFound {
                            model: model_id.clone(),
                            id: "<first>".to_string(),
                        })?,
                };
                let mut changes = JsonMap::new();
                changes.insert(field.clone(), source_value);
                self.ctx.store.update_record(model_id, &record_id, changes)?;
            }
            BindingSource::Collection { model_id } => {
                return Err(RuntimeError::NotWritable(format!("collection {model_id}")));
            }
            BindingSource::State { key, path } => {
                let key: StateKey = key.parse()?;
                let value = match path {
                    Some(path) => {
                        let mut current = self.ctx.state.get(&key);
                        set_path(&mut current, path, source_value);
                        current
                    }
                    None => source_value,
                };
                self.ctx.state.set(&key, value)?;
            }
        }
        Ok(())
    }

    /// Releases a binding. Returns `false` if none was registered.
    pub fn unregister(&self, component_id: &str, prop: &str) -> bool {
        let key = (component_id.to_string(), prop.to_string());
        let removed = lock(&self.bindings).remove(&key);
        lock(&self.props).remove(&key);
        match removed {
            Some(binding) => {
                binding.release();
                true
            }
            None => false,
        }
    }

    /// Releases every binding of a component. Returns how many were removed.
    pub fn unregister_component(&self, component_id: &str) -> usize {
        let removed: Vec<ActiveBinding> = {
            let mut bindings = lock(&self.bindings);
            let keys: Vec<BindingKey> = bindings
                .keys()
                .filter(|(c, _)| c == component_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| bindings.remove(k)).collect()
        };
        lock(&self.props).retain(|(c, _), _| c != component_id);
        for binding in &removed {
            binding.release();
        }
        removed.len()
    }

    /// Releases every binding.
    pub fn clear(&self) {
        let removed: Vec<ActiveBinding> = lock(&self.bindings).drain().map(|(_, b)| b).collect();
        lock(&self.props).clear();
        for binding in &removed {
            binding.release();
        }
    }

    /// Last value written to a bound prop.
    pub fn prop(&self, component_id: &str, prop: &str) -> Option<Value> {
        lock(&self.props)
            .get(&(component_id.to_string(), prop.to_string()))
            .cloned()
    }

    /// All bound props of a component.
    pub fn props(&self, component_id: &str) -> BTreeMap<String, Value> {
        lock(&self.props)
            .iter()
            .filter(|((c, _), _)| c == component_id)
            .map(|((_, p), v)| (p.clone(), v.clone()))
            .collect()
    }

    pub fn binding_count(&self) -> usize {
        lock(&self.bindings).len()
    }

    pub fn spec(&self, component_id: &str, prop: &str) -> Option<BindingSpec> {
        lock(&self.bindings)
            .get(&(component_id.to_string(), prop.to_string()))
            .map(|b| b.spec.clone())
    }
}
