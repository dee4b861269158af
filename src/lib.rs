// Core infrastructure modules
pub mod core;

// Predicate and transaction layers
pub mod config;
pub mod context;
pub mod filter;
pub mod jsonb;
pub mod querier;
pub mod selectors;
pub mod tx;

#[cfg(test)]
mod test_utils;

pub use crate::config::{load_config, Config, DatabaseConfig};
pub use crate::context::{Context, ContextKey};
pub use crate::core::db::{
    Arg, DeleteQuery, Db, Dialect, Handle, InsertQuery, Joiner, Param, SelectQuery, SqliteTx,
    TableModel, UpdateQuery,
};
pub use crate::core::{is_constraint_error, is_not_found_error, Result, SqlweaveError};
pub use crate::filter::{order_asc, order_desc, ColumnDefaults, OrderMap, Where};
pub use crate::jsonb::*;
pub use crate::querier::{DbQuerier, Querier};
pub use crate::selectors::*;
pub use crate::tx::{in_tx, tx_from_context, tx_to_context, Database, Transaction, TX_KEY};
