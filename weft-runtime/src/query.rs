//! Simple record queries: field equality and containment, plus a limit.
//! Joins and reference resolution are left to callers.

use crate::value::{contains, loose_eq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_model::Record;

/// One filter over a record field (`id` included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Equals { field: String, value: Value },
    Contains { field: String, value: Value },
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Equals { field, value } => loose_eq(&record.field_value(field), value),
            Self::Contains { field, value } => contains(&record.field_value(field), value),
        }
    }
}

/// Conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Contains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Applies the query to records in collection order.
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<Record> {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
