/// Statement factory that follows the ambient transaction.

use crate::context::Context;
use crate::core::db::{DeleteQuery, Db, InsertQuery, SelectQuery, SqliteTx, UpdateQuery};
use crate::tx::{tx_from_context, Database};
use std::sync::Arc;

/// Creates statements bound to the ambient transaction when the context
/// carries one of this database's transactions, and to the database
/// otherwise.
pub trait Querier {
    fn new_select_query(&self, ctx: &Context) -> SelectQuery;
    fn new_insert_query(&self, ctx: &Context) -> InsertQuery;
    fn new_update_query(&self, ctx: &Context) -> UpdateQuery;
    fn new_delete_query(&self, ctx: &Context) -> DeleteQuery;
}

/// [`Querier`] over a SQLite [`Db`].
#[derive(Debug, Clone)]
pub struct DbQuerier {
    db: Db,
}

impl DbQuerier {
    pub fn new(db: Db) -> Self {
        DbQuerier { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn ambient(&self, ctx: &Context) -> Option<Arc<SqliteTx>> {
        tx_from_context::<SqliteTx>(ctx).filter(|tx| self.db.owns(tx))
    }
}

impl Querier for DbQuerier {
    fn new_select_query(&self, ctx: &Context) -> SelectQuery {
        match self.ambient(ctx) {
            Some(tx) => tx.new_select(),
            None => self.db.new_select(),
        }
    }

    fn new_insert_query(&self, ctx: &Context) -> InsertQuery {
        match self.ambient(ctx) {
            Some(tx) => tx.new_insert(),
            None => self.db.new_insert(),
        }
    }

    fn new_update_query(&self, ctx: &Context) -> UpdateQuery {
        match self.ambient(ctx) {
            Some(tx) => tx.new_update(),
            None => self.db.new_update(),
        }
    }

    fn new_delete_query(&self, ctx: &Context) -> DeleteQuery {
        match self.ambient(ctx) {
            Some(tx) => tx.new_delete(),
            None => self.db.new_delete(),
        }
    }
}
