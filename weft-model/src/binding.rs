use crate::Transform;
use serde::{Deserialize, Deserializer, Serialize};

/// Where a binding reads its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BindingSource {
    /// One field of one record. Without `record_id` the first record of the
    /// collection is used.
    Field {
        model_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        record_id: Option<String>,
        field: String,
    },
    /// The whole collection, as an array of flattened records.
    Collection { model_id: String },
    /// A state key (`custom:filter`, `component:title-input`, `page`, ...),
    /// optionally narrowed by a dotted path into its value.
    State {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

/// Declares a live link from a source to one UI prop of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    /// Target prop on the component.
    pub prop: String,
    pub source: BindingSource,
    /// Transform pipeline; accepts a single transform or a list.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub transform: Vec<Transform>,
    #[serde(default)]
    pub two_way: bool,
}

impl BindingSpec {
    pub fn new(prop: impl Into<String>, source: BindingSource) -> Self {
        Self {
            prop: prop.into(),
            source,
            transform: Vec::new(),
            two_way: false,
        }
    }

    pub fn field(prop: impl Into<String>, model_id: &str, record_id: &str, field: &str) -> Self {
        Self::new(
            prop,
            BindingSource::Field {
                model_id: model_id.to_string(),
                record_id: Some(record_id.to_string()),
                field: field.to_string(),
            },
        )
    }

    pub fn state(prop: impl Into<String>, key: &str) -> Self {
        Self::new(
            prop,
            BindingSource::State {
                key: key.to_string(),
                path: None,
            },
        )
    }

    pub fn collection(prop: impl Into<String>, model_id: &str) -> Self {
        Self::new(
            prop,
            BindingSource::Collection {
                model_id: model_id.to_string(),
            },
        )
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform.push(transform);
        self
    }

    pub fn two_way(mut self) -> Self {
        self.two_way = true;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Transform),
    Many(Vec<Transform>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Transform>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(t)) => vec![t],
        Some(OneOrMany::Many(ts)) => ts,
        None => Vec::new(),
    })
}
