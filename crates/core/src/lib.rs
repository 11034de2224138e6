//! Core data structures for the crosscheck conflict review system

pub mod conflict;
pub mod types;
pub mod value;

pub use conflict::{
    CacheKey, Conflict, ConflictDetail, ConflictKind, ConflictStatus, CrossFieldViolation,
    MismatchGroup, Priority, Resolution, ResolutionMethod,
};
pub use types::{ConflictId, RecordId, ValueId};
pub use value::{DocumentRef, FieldKind, FieldValue, SourceKind, TypedValue};

/// Core error types
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("confidence {0} out of range [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
