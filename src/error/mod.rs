//! Error handling for the entity writer.
//!
//! A single error enum covers the pipeline stages, the writer lifecycle and the
//! storage backends. Backend failures are carried through unchanged so callers
//! can decide whether to retry a run or abort it.

use thiserror::Error;

/// Specialized error type for record conversion and entity persistence
#[derive(Debug, Error)]
pub enum Error {
    /// The input handed to a stage is not a record, or a record field holds a
    /// value shape that cannot be represented
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A source field required to compute another field is absent
    #[error("{field} is missing")]
    MissingField {
        /// Name of the absent field
        field: String,
    },

    /// The backend does not expose a capability the configuration asks for
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// An operation was invoked outside its valid lifecycle state
    #[error("Cannot {operation} while writer is {state}")]
    InvalidState {
        /// The operation that was attempted
        operation: &'static str,
        /// The lifecycle state the writer was in
        state: String,
    },

    /// Configuration values are out of range or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record value cannot be coerced into the declared type of an entity field
    #[error("Cannot convert field '{field}': expected {expected}, found {found}")]
    Conversion {
        /// Entity field being assigned
        field: String,
        /// Declared field type
        expected: &'static str,
        /// Description of the offending value
        found: String,
    },

    /// The store rejected a commit, e.g. a duplicate or missing identity
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an `InvalidState` error
    pub(crate) fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Build a `MissingField` error
    pub(crate) fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Result type for entity writer operations
pub type Result<T> = std::result::Result<T, Error>;
