/// Core Module for sqlweave
///
/// This module contains the statement builders, the SQLite connection layer
/// and the shared error type that the predicate and transaction layers are
/// built on.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{is_constraint_error, is_not_found_error, Result, SqlweaveError};
