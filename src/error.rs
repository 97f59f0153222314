//! Error types for the binding codec

use thiserror::Error;

use crate::schema::{QName, SchemaPath};
use crate::typed::TypeName;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Binding codec errors
///
/// Structural variants indicate a codec/schema/version inconsistency and are
/// always fatal to the operation that raised them. They are never recovered
/// silently. Cache misses are not errors and never surface here.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Schema node not found at {path}")]
    SchemaNodeNotFound { path: SchemaPath },

    #[error("No generated type for schema node at {path}")]
    TypeNotFound { path: SchemaPath },

    #[error("Type {name} is not known to this schema snapshot")]
    UnknownType { name: TypeName },

    #[error("Failed to load type {name}: {reason}")]
    TypeLoad { name: TypeName, reason: String },

    #[error("Value of type {actual} supplied where {expected} was expected")]
    TypeMismatch { expected: TypeName, actual: TypeName },

    #[error("Node {node} does not match schema child {child} at {path}")]
    SchemaMismatch {
        node: String,
        child: QName,
        path: SchemaPath,
    },

    #[error("Choice {choice} has {count} case children present, expected exactly one")]
    AmbiguousChoice { choice: QName, count: usize },

    #[error("Class {name} is not a valid case of choice {choice}")]
    InvalidCase { name: TypeName, choice: QName },

    #[error("Scalar value {value} does not match leaf type for {leaf}")]
    ScalarMismatch { leaf: QName, value: String },

    #[error("Mandatory key leaf {key} is missing from entry of list {list}")]
    MissingKey { list: QName, key: QName },

    #[error("Wildcard list step {qname} must be the final path step")]
    TrailingStepsAfterWildcard { qname: QName },

    #[error("Augmentation target {path} cannot be resolved")]
    UnresolvedAugmentTarget { path: SchemaPath },

    #[error("Duplicate augmentation identifier override {name:?} on target {path}")]
    DuplicateAugmentOverride { name: String, path: SchemaPath },

    #[error("Supplied QName {qname} is not a valid identity")]
    UnknownIdentity { qname: QName },

    #[error("Caching codec was created against snapshot {expected}, used with {actual}")]
    SnapshotMismatch { expected: String, actual: String },

    #[error("No schema snapshot has been adopted")]
    NoSchema,

    #[error("Schema validation failed: {0}")]
    Validation(String),

    #[error("Opaque payload error: {0}")]
    Opaque(#[from] serde_json::Error),
}
