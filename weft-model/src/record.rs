use crate::JsonMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_types::{RecordId, Timestamp};

/// One addressable unit of model data.
///
/// Records are owned by the data store's per-model collection. Consumers
/// always receive clones; mutation goes through the store's entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub model: String,
    #[serde(default)]
    pub data: JsonMap,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub modified_at: Timestamp,
}

impl Record {
    /// Builds a record stamped with the current time. An `id` key inside
    /// `data` is dropped; the record id is authoritative.
    pub fn new(model: impl Into<String>, id: RecordId, mut data: JsonMap) -> Self {
        data.remove("id");
        let now = Timestamp::now();
        Self {
            id,
            model: model.into(),
            data,
            created_at: now,
            modified_at: now,
        }
    }

    /// Raw field access.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == "id" {
            return None;
        }
        self.data.get(field)
    }

    /// Extract a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|v| v.as_str())
    }

    /// Extract a boolean field.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(|v| v.as_bool())
    }

    /// Extract a numeric field.
    pub fn get_number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(|v| v.as_f64())
    }

    /// Flattened view (`id` plus every data field) used for expression
    /// evaluation and binding sources.
    pub fn to_value(&self) -> Value {
        let mut obj = self.data.clone();
        obj.insert("id".into(), Value::String(self.id.to_string()));
        Value::Object(obj)
    }

    /// Resolves a field, treating `id` as a virtual field.
    pub fn field_value(&self, field: &str) -> Value {
        if field == "id" {
            return Value::String(self.id.to_string());
        }
        self.data.get(field).cloned().unwrap_or(Value::Null)
    }
}
