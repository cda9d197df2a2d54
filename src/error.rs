//! Error types for the Pelta library.
//!
//! All failures surface as [`PeltaError`]. The variants map onto the error
//! taxonomy the storage core distinguishes between: schema conflicts and
//! malformed input are caller-attributable and synchronous, I/O errors come
//! from the storage substrate, and illegal-state errors signal misuse of an
//! iterator protocol (advancing positions past a term's frequency, reading a
//! payload before the first position).

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Pelta operations.
#[derive(Error, Debug)]
pub enum PeltaError {
    /// I/O errors from the storage substrate.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Index-related errors (corrupt files, inconsistent segment state).
    #[error("Index error: {0}")]
    Index(String),

    /// Incompatible redefinition of a field's shape. Always carries both the
    /// established and the conflicting shape in the message.
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// Malformed input rejected at document-construction time, before any
    /// write I/O (empty vectors, duplicate single-valued fields).
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Iterator-protocol misuse by the caller. Distinct from I/O and schema
    /// errors so callers can tell a programming error from a bad file.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Storage-related errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Merge-related errors.
    #[error("Merge error: {0}")]
    Merge(String),

    /// Invalid operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PeltaError.
pub type Result<T> = std::result::Result<T, PeltaError>;

impl PeltaError {
    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PeltaError::Index(msg.into())
    }

    /// Create a new schema-conflict error.
    pub fn schema_conflict<S: Into<String>>(msg: S) -> Self {
        PeltaError::SchemaConflict(msg.into())
    }

    /// Create a new malformed-input error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        PeltaError::MalformedInput(msg.into())
    }

    /// Create a new illegal-state error.
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        PeltaError::IllegalState(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        PeltaError::Storage(msg.into())
    }

    /// Create a new merge error.
    pub fn merge<S: Into<String>>(msg: S) -> Self {
        PeltaError::Merge(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        PeltaError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PeltaError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PeltaError::index("Test index error");
        assert_eq!(error.to_string(), "Index error: Test index error");

        let error = PeltaError::schema_conflict("dim mismatch");
        assert_eq!(error.to_string(), "Schema conflict: dim mismatch");

        let error = PeltaError::illegal_state("positions exhausted");
        assert_eq!(error.to_string(), "Illegal state: positions exhausted");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let pelta_error = PeltaError::from(io_error);

        match pelta_error {
            PeltaError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_taxonomy_is_distinguishable() {
        let schema = PeltaError::schema_conflict("x");
        let malformed = PeltaError::malformed("y");
        let illegal = PeltaError::illegal_state("z");

        assert!(matches!(schema, PeltaError::SchemaConflict(_)));
        assert!(matches!(malformed, PeltaError::MalformedInput(_)));
        assert!(matches!(illegal, PeltaError::IllegalState(_)));
    }
}
