/// Database Module
///
/// This module provides the statement layer sqlweave's predicates operate on,
/// organized into focused submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): shared connection, transaction handle and its states
/// - **Bound Parameters** (`param.rs`): owned values and template arguments
/// - **Rendering** (`render.rs`): dialects, identifier quoting, template expansion
/// - **Query Building** (`query.rs`): SELECT/INSERT/UPDATE/DELETE builders and execution
/// - **Schema Introspection** (`schema.rs`): column lists for column exclusion
///
/// ## Error Handling
///
/// All database operations use the standardized `SqlweaveError` type for consistent error propagation.
pub mod connection;
pub mod param;
pub mod query;
pub mod render;
pub mod schema;

pub use connection::*;
pub use param::*;
pub use query::*;
pub use render::{quote_ident, Dialect, TABLE_ALIAS};
