use thiserror::Error;

pub mod obj;
pub mod path;
pub mod query;
pub mod update;

// Re-export record types
pub use obj::{Actor, FieldDescriptor, JsonType, NewObj, Obj, ObjField};

// Re-export path types
pub use path::{FieldPath, PathSegment};

// Re-export query model types
pub use query::{
    Column, DeletedAtQuery, DurationUnit, FieldOp, IsNullQuery, LogicalQuery, MetaField,
    MetaQuery, MetaQueryMap, NumberMetaQuery, NumberOrDuration, ObjQuery, PartQueryItem, RelativeDuration,
    SortDirection, SortItem, StringMetaQuery, TopLevelFieldsQuery, TypedMetaQuery,
};

// Re-export update policy types
pub use update::{OnConflict, UpdateWay};

/// Errors surfaced by the store, its compilers and its backends.
///
/// Not-found on single-record operations is deliberately absent: those are
/// zero-count no-ops.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed query shapes, unknown operators, conflicting predicate families.
    /// Always raised before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uniqueness violations on create.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Driver or transport failures, propagated unchanged.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
