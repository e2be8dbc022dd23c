//! Per-model record collections with notify-on-mutate semantics.
//!
//! Each mutation applies the change, hands every subscriber of that model
//! the full updated [`RecordSet`], then emits the delta event on the bus.
//! All of this happens before the mutating call returns, so no caller can
//! observe a half-propagated change.

use crate::error::{RuntimeError, RuntimeResult};
use crate::event::EventPayload;
use crate::event_bus::EventBus;
use crate::query::Query;
use crate::subscription::{isolate, lock, Subscribers, Subscription};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;
use weft_model::{DataModel, JsonMap, Record};
use weft_types::{RecordId, Timestamp};

/// Snapshot of a model's collection handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub model: String,
    /// Bumped on every mutation of the collection.
    pub generation: u64,
    pub records: Vec<Record>,
}

/// Callback invoked with the full record set after each mutation.
pub type RecordsCallback = dyn Fn(&RecordSet) + Send + Sync;

#[derive(Debug, Default)]
struct Collection {
    records: Vec<Record>,
    generation: u64,
}

impl Collection {
    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id.as_str() == id)
    }

    fn bump(&mut self, model: &str) -> RecordSet {
        self.generation += 1;
        RecordSet {
            model: model.to_string(),
            generation: self.generation,
            records: self.records.clone(),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    collections: HashMap<String, Collection>,
    models: HashMap<String, DataModel>,
    subscribers: Subscribers<String, RecordsCallback>,
}

/// Owns every record of the running app.
pub struct DataStore {
    inner: Arc<Mutex<StoreInner>>,
    bus: Arc<EventBus>,
}

impl DataStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            bus,
        }
    }

    /// Registers model definitions and creates their (empty) collections.
    /// Existing records are kept.
    pub fn register_models(&self, models: &[DataModel]) {
        let mut inner = lock(&self.inner);
        for model in models {
            inner.collections.entry(model.id.clone()).or_default();
            inner.models.insert(model.id.clone(), model.clone());
        }
        debug!("registered {} data models", models.len());
    }

    /// Known model ids, sorted.
    pub fn models(&self) -> Vec<String> {
        let inner = lock(&self.inner);
        let mut ids: Vec<String> = inner.collections.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_model(&self, model: &str) -> bool {
        lock(&self.inner).collections.contains_key(model)
    }

    /// All records of a model in insertion order. Unknown models yield an
    /// empty list.
    pub fn get_records(&self, model: &str) -> Vec<Record> {
        lock(&self.inner)
            .collections
            .get(model)
            .map(|c| c.records.clone())
            .unwrap_or_default()
    }

    pub fn get_record(&self, model: &str, id: &str) -> Option<Record> {
        let inner = lock(&self.inner);
        let collection = inner.collections.get(model)?;
        collection.position(id).map(|i| collection.records[i].clone())
    }

    pub fn query(&self, model: &str, query: &Query) -> Vec<Record> {
        lock(&self.inner)
            .collections
            .get(model)
            .map(|c| query.apply(&c.records))
            .unwrap_or_default()
    }

    /// Current generation of a model's collection.
    pub fn generation(&self, model: &str) -> Option<u64> {
        lock(&self.inner).collections.get(model).map(|c| c.generation)
    }

    /// Every collection, keyed by model id.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Record>> {
        lock(&self.inner)
            .collections
            .iter()
            .map(|(model, c)| (model.clone(), c.records.clone()))
            .collect()
    }

    /// Builds a record for `model` without storing it: fills field defaults,
    /// checks required fields and takes the id from `data` when present.
    pub fn build_record(&self, model: &str, data: JsonMap) -> RuntimeResult<Record> {
        let inner = lock(&self.inner);
        if !inner.collections.contains_key(model) {
            return Err(RuntimeError::ModelNotFound(model.to_string()));
        }
        prepare_record(model, inner.models.get(model), data)
    }

    /// Replaces a model's collection wholesale. Creates the collection if the
    /// model was not known. Fails without touching the collection when two
    /// records share an id.
    pub fn set_records(&self, model: &str, records: Vec<Record>) -> RuntimeResult<()> {
        if let Some(id) = first_repeated_id(&records) {
            return Err(RuntimeError::DuplicateRecord {
                model: model.to_string(),
                id,
            });
        }
        let count = records.len();
        let (set, subscribers) = {
            let mut inner = lock(&self.inner);
            let collection = inner.collections.entry(model.to_string()).or_default();
            collection.records = records
                .into_iter()
                .map(|mut r| {
                    r.model = model.to_string();
                    r
                })
                .collect();
            let set = collection.bump(model);
            (set, subscribers_for(&inner, model))
        };
        debug!("replaced {} records in {}", count, model);
        deliver(&set, &subscribers);
        self.bus.emit(EventPayload::RecordsReplaced {
            model: model.to_string(),
            count,
        });
        Ok(())
    }

    /// Creates a record. An `id` key in `data` is used as the record id;
    /// otherwise one is generated.
    pub fn create_record(&self, model: &str, data: JsonMap) -> RuntimeResult<Record> {
        let (record, set, subscribers) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let definition = inner.models.get(model);
            let collection = inner
                .collections
                .get_mut(model)
                .ok_or_else(|| RuntimeError::ModelNotFound(model.to_string()))?;
            let record = prepare_record(model, definition, data)?;
            if collection.position(record.id.as_str()).is_some() {
                return Err(RuntimeError::DuplicateRecord {
                    model: model.to_string(),
                    id: record.id.to_string(),
                });
            }
            collection.records.push(record.clone());
            let set = collection.bump(model);
            (record, set, subscribers_for(inner, model))
        };
        debug!("created {}/{}", model, record.id);
        deliver(&set, &subscribers);
        self.bus.emit(EventPayload::RecordCreated {
            model: model.to_string(),
            record: record.clone(),
        });
        Ok(record)
    }

    /// Shallow-merges `changes` into a record. `id` cannot be changed.
    pub fn update_record(&self, model: &str, id: &str, changes: JsonMap) -> RuntimeResult<Record> {
        let (record, previous, set, subscribers) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let collection = inner
                .collections
                .get_mut(model)
                .ok_or_else(|| RuntimeError::ModelNotFound(model.to_string()))?;
            let index = collection.position(id).ok_or_else(|| RuntimeError::RecordNotFound {
                model: model.to_string(),
                id: id.to_string(),
            })?;
            let previous = collection.records[index].clone();
            let current = &mut collection.records[index];
            for (key, value) in changes {
                if key != "id" {
                    current.data.insert(key, value);
                }
            }
            current.modified_at = Timestamp::now();
            let record = current.clone();
            let set = collection.bump(model);
            (record, previous, set, subscribers_for(inner, model))
        };
        debug!("updated {}/{}", model, id);
        deliver(&set, &subscribers);
        self.bus.emit(EventPayload::RecordUpdated {
            model: model.to_string(),
            record: record.clone(),
            previous,
        });
        Ok(record)
    }

    pub fn delete_record(&self, model: &str, id: &str) -> RuntimeResult<Record> {
        let (record, set, subscribers) = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let collection = inner
                .collections
                .get_mut(model)
                .ok_or_else(|| RuntimeError::ModelNotFound(model.to_string()))?;
            let index = collection.position(id).ok_or_else(|| RuntimeError::RecordNotFound {
                model: model.to_string(),
                id: id.to_string(),
            })?;
            let record = collection.records.remove(index);
            let set = collection.bump(model);
            (record, set, subscribers_for(inner, model))
        };
        debug!("deleted {}/{}", model, id);
        deliver(&set, &subscribers);
        self.bus.emit(EventPayload::RecordDeleted {
            model: model.to_string(),
            record: record.clone(),
        });
        Ok(record)
    }

    /// Subscribes to a model. The model need not exist yet.
    pub fn subscribe<F>(&self, model: &str, callback: F) -> Subscription
    where
        F: Fn(&RecordSet) + Send + Sync + 'static,
    {
        let id = lock(&self.inner)
            .subscribers
            .insert(model.to_string(), Arc::new(callback));
        let inner = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner).subscribers.remove(id);
            }
        })
    }

    pub fn subscriber_count(&self, model: &str) -> usize {
        lock(&self.inner).subscribers.count(|m| m == model)
    }

    /// Drops every collection, model definition and subscriber.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.collections.clear();
        inner.models.clear();
        inner.subscribers.clear();
    }
}

fn first_repeated_id(records: &[Record]) -> Option<String> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .find(|r| !seen.insert(r.id.as_str()))
        .map(|r| r.id.to_string())
}

fn subscribers_for(inner: &StoreInner, model: &str) -> Vec<Arc<RecordsCallback>> {
    inner.subscribers.snapshot(|m| m == model)
}

fn deliver(set: &RecordSet, subscribers: &[Arc<RecordsCallback>]) {
    let label = format!("model {}", set.model);
    for callback in subscribers {
        isolate(&label, || callback(set));
    }
}

fn prepare_record(
    model: &str,
    definition: Option<&DataModel>,
    mut data: JsonMap,
) -> RuntimeResult<Record> {
    let id = match data.remove("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => RecordId::from(s.trim()),
        Some(Value::Number(n)) => RecordId::from(n.to_string()),
        _ => RecordId::generate(),
    };

    if let Some(definition) = definition {
        for field in &definition.fields {
            if !data.contains_key(&field.name)
                && let Some(initial) = field.initial_value()
            {
                data.insert(field.name.clone(), initial);
            }
            if field.required && data.get(&field.name).is_none_or(crate::value::is_empty) {
                return Err(RuntimeError::MissingField {
                    model: model.to_string(),
                    field: field.name.clone(),
                });
            }
        }
    }

    Ok(Record::new(model, id, data))
}
