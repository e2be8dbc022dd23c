//! Error types for the runtime.

use thiserror::Error;
use weft_model::SchemaError;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by runtime components.
///
/// Permission denials from query-style calls (`can_view_page`, `filter_rows`)
/// are plain `false`/empty results, not errors. `AccessDenied` is only used
/// where an operation was refused outright.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("record '{id}' not found in model '{model}'")]
    RecordNotFound { model: String, id: String },

    #[error("record '{id}' already exists in model '{model}'")]
    DuplicateRecord { model: String, id: String },

    #[error("missing required field '{field}' for model '{model}'")]
    MissingField { model: String, field: String },

    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("flow not found: {0}")]
    FlowNotFound(String),

    #[error("layout not found: {0}")]
    LayoutNotFound(String),

    #[error("no binding for {component_id}.{prop}")]
    BindingNotFound { component_id: String, prop: String },

    #[error("access denied: role '{role}' cannot {operation}")]
    AccessDenied { role: String, operation: String },

    #[error("invalid state key: {0}")]
    InvalidStateKey(String),

    #[error("not writable: {0}")]
    NotWritable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
