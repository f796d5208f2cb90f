//! Store error types.

use thiserror::Error;

/// Errors raised by store writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row with the same identifier already exists.
    #[error("Duplicate {table} row {id}")]
    DuplicateId { table: &'static str, id: String },

    /// A uniqueness constraint was violated.
    #[error("Unique constraint {constraint} violated on {table}: {key}")]
    UniqueViolation {
        table: &'static str,
        constraint: &'static str,
        key: String,
    },

    /// A foreign key points at a missing row.
    #[error("{table}.{column} references missing row {id}")]
    ForeignKeyViolation {
        table: &'static str,
        column: &'static str,
        id: String,
    },

    /// A row failed value validation.
    #[error("Invalid {table} row: {message}")]
    Validation { table: &'static str, message: String },

    /// Updated row does not exist.
    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: String },

    /// Rows of the table are never mutated after creation.
    #[error("{table} rows are immutable")]
    Immutable { table: &'static str },
}

impl StoreError {
    /// The error rejects a single row rather than the transaction.
    pub fn is_row_invalid(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation { .. }
                | StoreError::ForeignKeyViolation { .. }
                | StoreError::Validation { .. }
        )
    }

    /// Get error code for logs and fault reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::DuplicateId { .. } => "DUPLICATE_ID",
            StoreError::UniqueViolation { .. } => "UNIQUE_VIOLATION",
            StoreError::ForeignKeyViolation { .. } => "FOREIGN_KEY_VIOLATION",
            StoreError::Validation { .. } => "RECORD_INVALID",
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Immutable { .. } => "IMMUTABLE",
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
