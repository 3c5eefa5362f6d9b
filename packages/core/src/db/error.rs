//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection, initialization and statement failures. Tree-level
/// meaning (overflow, missing nodes, ...) is added by `TreeError`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A write collided with an existing `path` (UNIQUE constraint)
    #[error("Unique constraint violated: {context}")]
    UniqueViolation { context: String },

    /// The backend cannot execute statements of this dialect
    #[error("Dialect '{dialect}' is not supported by the libsql backend")]
    UnsupportedDialect { dialect: String },

    /// A stored row could not be decoded
    #[error("Malformed row: {0}")]
    MalformedRow(String),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Classify a failed statement
    ///
    /// Unique-constraint failures are kept apart so callers can treat them
    /// as concurrency conflicts rather than hard failures.
    pub fn from_statement(context: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::UniqueViolation {
                context: format!("{}: {}", context, message),
            }
        } else {
            Self::sql_execution(format!("{}: {}", context, message))
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_execution_message() {
        let err = DatabaseError::sql_execution("Failed to insert node");
        assert_eq!(err.to_string(), "SQL execution failed: Failed to insert node");
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_unique_violation_is_classified() {
        let err = DatabaseError::from_statement(
            "Failed to insert node",
            libsql::Error::SqliteFailure(2067, "UNIQUE constraint failed: tree_nodes.path".into()),
        );
        assert!(err.is_unique_violation());
    }
}
