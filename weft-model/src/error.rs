use thiserror::Error;

/// Errors raised while loading or validating an [`AppSchema`](crate::AppSchema).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },

    #[error("role hierarchy is empty")]
    EmptyRoleHierarchy,

    #[error("default role '{0}' is not part of the role hierarchy")]
    UnknownDefaultRole(String),
}
