/// Sqlweave Error Module
///
/// This module defines the error type shared by the query builder, the
/// connection layer and the transaction wrapper, plus the classification
/// helpers callers use to branch on common database failures.
use thiserror::Error;

/// Comprehensive error type for sqlweave.
///
/// This enum covers every failure the crate can surface:
/// - Database operations (open, prepare, execute, begin/commit/rollback)
/// - Query rendering (placeholder mismatches, missing table, empty projection)
/// - Configuration loading
/// - Transaction lifecycle misuse
/// - A unit of work failing and the rollback failing as well
#[derive(Error, Debug)]
pub enum SqlweaveError {
    /// Database-related errors from SQLite operations
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Query rendering and execution errors
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and validation errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transaction-related errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A unit of work failed and rolling the transaction back failed too.
    ///
    /// `source` is the unit-of-work error and is what `Error::source()` returns.
    #[error("{source}: transaction rollback error: {rollback}")]
    Rollback {
        #[source]
        source: Box<SqlweaveError>,
        rollback: Box<SqlweaveError>,
    },

    /// Generic application errors raised by units of work
    #[error("Application error: {0}")]
    App(String),
}

impl SqlweaveError {
    /// Returns the error that started the failure, looking through rollback
    /// wrappers.
    pub fn original(&self) -> &SqlweaveError {
        match self {
            SqlweaveError::Rollback { source, .. } => source.original(),
            other => other,
        }
    }
}

/// Type alias for Result to use SqlweaveError as the error type.
pub type Result<T> = std::result::Result<T, SqlweaveError>;

const UNIQUE_VIOLATION_MESSAGES: [&str; 2] = [
    "UNIQUE constraint failed",
    "duplicate key value violates unique constraint",
];

/// Reports whether the error is a constraint violation.
pub fn is_constraint_error(err: &SqlweaveError) -> bool {
    let err = err.original();
    if let SqlweaveError::Database(rusqlite::Error::SqliteFailure(failure, _)) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return true;
        }
    }
    let message = err.to_string();
    UNIQUE_VIOLATION_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Reports whether the error means a single-row lookup found nothing.
pub fn is_not_found_error(err: &SqlweaveError) -> bool {
    matches!(
        err.original(),
        SqlweaveError::Database(rusqlite::Error::QueryReturnedNoRows)
    )
}
