//! Core type definitions for Weft.
//!
//! This crate defines the leaf types used throughout the runtime:
//! - Record, notification and event identifiers
//! - Wall-clock millisecond timestamps
//!
//! Schema types (pages, models, flows) live in `weft-model`; live behaviour
//! lives in `weft-runtime`.

mod ids;
mod timestamp;

pub use ids::{EventId, NotificationId, RecordId};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
