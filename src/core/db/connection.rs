/// Connection Management Module
///
/// This module provides the shared SQLite connection handle, the transaction
/// handle with its own dedicated connection, and the lifecycle state the
/// transaction moves through.

use super::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::core::{Result, SqlweaveError};
use crate::tx::{Database, Transaction};
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const JOURNAL_MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction in progress
    Active,
    /// Transaction committed
    Committed,
    /// Transaction rolled back
    RolledBack,
    /// COMMIT or ROLLBACK failed; only a rollback may follow
    Failed,
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState::Active
    }
}

// A panic inside a row callback poisons the mutex but leaves the SQLite
// connection usable, and the rollback after a panic still has to run.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

// Opens one connection to `target` and applies the configured pragmas.
fn connect(target: &str, config: &DatabaseConfig) -> Result<Connection> {
    let conn = Connection::open_with_flags(target, OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI)?;

    conn.execute_batch(if config.foreign_keys {
        "PRAGMA foreign_keys = ON;"
    } else {
        "PRAGMA foreign_keys = OFF;"
    })?;

    if let Some(mode) = &config.journal_mode {
        let mode = mode.to_uppercase();
        if !JOURNAL_MODES.contains(&mode.as_str()) {
            return Err(SqlweaveError::Config(format!("unknown journal mode: {}", mode)));
        }
        let applied: String =
            conn.query_row(&format!("PRAGMA journal_mode = {}", mode), [], |row| row.get(0))?;
        debug!(requested = %mode, applied = %applied, "journal mode set");
    }

    if let Some(ms) = config.busy_timeout_ms {
        conn.busy_timeout(Duration::from_millis(ms))?;
    }
    Ok(conn)
}

struct Shared {
    id: Uuid,
    conn: Mutex<Connection>,
    // Path or URI every transaction connection is opened on.
    target: String,
    config: DatabaseConfig,
}

/// Shared handle to a SQLite database.
///
/// Cloning is cheap; every clone runs autocommit statements on the same
/// connection. Each transaction gets a connection of its own, so work outside
/// a transaction never joins one. `:memory:` opens a named shared-cache
/// database that lives as long as any clone does.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("id", &self.shared.id)
            .field("target", &self.shared.target)
            .field("immediate", &self.shared.config.immediate_transactions)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Opens the database described by `config` and applies its pragmas.
    ///
    /// # Arguments
    ///
    /// * `config` - Path (`:memory:` for an in-memory database) and open options
    ///
    /// # Returns
    ///
    /// `Ok(Db)` on success, `SqlweaveError::Database` when SQLite refuses the
    /// path, `SqlweaveError::Config` for an unknown journal mode.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let target = if config.path == ":memory:" {
            format!("file:sqlweave-{}?mode=memory&cache=shared", id.simple())
        } else {
            config.path.clone()
        };
        let conn = connect(&target, config)?;

        info!(path = %config.path, db = %id, "opened database");
        Ok(Db {
            shared: Arc::new(Shared {
                id,
                conn: Mutex::new(conn),
                target,
                config: config.clone(),
            }),
        })
    }

    /// Opens a private in-memory database with default options.
    pub fn open_in_memory() -> Result<Self> {
        Db::open(&DatabaseConfig::default())
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Runs `f` with exclusive access to the autocommit connection.
    pub fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let guard = lock(&self.shared.conn);
        f(&guard)
    }

    pub fn new_select(&self) -> SelectQuery {
        SelectQuery::from_handle(Handle::Db(self.clone()))
    }

    pub fn new_insert(&self) -> InsertQuery {
        InsertQuery::from_handle(Handle::Db(self.clone()))
    }

    pub fn new_update(&self) -> UpdateQuery {
        UpdateQuery::from_handle(Handle::Db(self.clone()))
    }

    pub fn new_delete(&self) -> DeleteQuery {
        DeleteQuery::from_handle(Handle::Db(self.clone()))
    }
}

impl Database for Db {
    type Tx = SqliteTx;

    fn begin(&self, _ctx: &Context) -> Result<SqliteTx> {
        let conn = connect(&self.shared.target, &self.shared.config)?;
        let sql = if self.shared.config.immediate_transactions {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN"
        };
        conn.execute_batch(sql)?;

        let tx = SqliteTx {
            id: Uuid::new_v4(),
            db_id: self.shared.id,
            conn: Mutex::new(conn),
            state: Mutex::new(TransactionState::Active),
        };
        debug!(tx = %tx.id, db = %tx.db_id, "began transaction");
        Ok(tx)
    }

    fn owns(&self, tx: &SqliteTx) -> bool {
        tx.db_id == self.shared.id
    }
}

/// An open SQLite transaction on a connection of its own.
///
/// Statements created from it fail once it is committed or rolled back.
/// Dropping it while still open rolls it back.
pub struct SqliteTx {
    id: Uuid,
    db_id: Uuid,
    conn: Mutex<Connection>,
    state: Mutex<TransactionState>,
}

impl fmt::Debug for SqliteTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTx")
            .field("id", &self.id)
            .field("db", &self.db_id)
            .field("state", &self.state())
            .finish()
    }
}

impl SqliteTx {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the [`Db`] that began this transaction.
    pub fn db_id(&self) -> Uuid {
        self.db_id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the connection if the transaction is still active.
    pub fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        if self.state() != TransactionState::Active {
            return Err(SqlweaveError::Transaction(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }
        let guard = lock(&self.conn);
        f(&guard)
    }

    pub fn new_select(self: &Arc<Self>) -> SelectQuery {
        SelectQuery::from_handle(Handle::Tx(self.clone()))
    }

    pub fn new_insert(self: &Arc<Self>) -> InsertQuery {
        InsertQuery::from_handle(Handle::Tx(self.clone()))
    }

    pub fn new_update(self: &Arc<Self>) -> UpdateQuery {
        UpdateQuery::from_handle(Handle::Tx(self.clone()))
    }

    pub fn new_delete(self: &Arc<Self>) -> DeleteQuery {
        DeleteQuery::from_handle(Handle::Tx(self.clone()))
    }

    fn finish(&self, sql: &str, done: TransactionState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let allowed = match done {
            TransactionState::RolledBack => {
                matches!(*state, TransactionState::Active | TransactionState::Failed)
            }
            _ => *state == TransactionState::Active,
        };
        if !allowed {
            return Err(SqlweaveError::Transaction(
                "transaction has already been committed or rolled back".to_string(),
            ));
        }

        match lock(&self.conn).execute_batch(sql) {
            Ok(()) => {
                *state = done;
                Ok(())
            }
            Err(e) => {
                *state = TransactionState::Failed;
                Err(e.into())
            }
        }
    }
}

impl Transaction for SqliteTx {
    fn commit(&self) -> Result<()> {
        self.finish("COMMIT", TransactionState::Committed)?;
        debug!(tx = %self.id, "committed transaction");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK", TransactionState::RolledBack)?;
        debug!(tx = %self.id, "rolled back transaction");
        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let state = *self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(state, TransactionState::Active | TransactionState::Failed) {
            let conn = lock(&self.conn);
            if !conn.is_autocommit() {
                warn!(tx = %self.id, ?state, "rolling back abandoned transaction");
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!(tx = %self.id, error = %e, "rollback of abandoned transaction failed");
                }
            }
        }
    }
}

/// Where a statement runs: straight on the database or inside a transaction.
#[derive(Debug, Clone)]
pub enum Handle {
    Db(Db),
    Tx(Arc<SqliteTx>),
}

impl Handle {
    pub fn is_transaction(&self) -> bool {
        matches!(self, Handle::Tx(_))
    }

    pub fn with_connection<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        match self {
            Handle::Db(db) => db.with_connection(f),
            Handle::Tx(tx) => tx.with_connection(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn setup(db: &Db) {
        db.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT);")?;
            Ok(())
        })
        .unwrap();
    }

    fn count(db: &Db) -> i64 {
        db.with_connection(|conn| Ok(conn.query_row("SELECT count(*) FROM kv", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_begin_commit() {
        let db = Db::open_in_memory().unwrap();
        setup(&db);

        let tx = Arc::new(db.begin(&Context::background()).unwrap());
        assert_eq!(tx.state(), TransactionState::Active);
        let mut insert = tx.new_insert();
        insert.table("kv").value("k", "a").value("v", "1");
        insert.exec().unwrap();

        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let db = Db::open_in_memory().unwrap();
        setup(&db);

        let tx = Arc::new(db.begin(&Context::background()).unwrap());
        let mut insert = tx.new_insert();
        insert.table("kv").value("k", "a").value("v", "1");
        insert.exec().unwrap();

        tx.rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_finished_transaction_rejects_statements() {
        let db = Db::open_in_memory().unwrap();
        setup(&db);

        let tx = Arc::new(db.begin(&Context::background()).unwrap());
        tx.commit().unwrap();

        let mut select = tx.new_select();
        select.table("kv");
        match select.fetch() {
            Err(SqlweaveError::Transaction(msg)) => assert!(msg.contains("already been committed")),
            other => panic!("Expected Transaction error, got {:?}", other),
        }
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_err());
    }

    #[test]
    fn test_dropping_active_transaction_rolls_back() {
        let db = Db::open_in_memory().unwrap();
        setup(&db);

        {
            let tx = Arc::new(db.begin(&Context::background()).unwrap());
            let mut insert = tx.new_insert();
            insert.table("kv").value("k", "a").value("v", "1");
            insert.exec().unwrap();
        }

        assert_eq!(count(&db), 0);
        assert!(db.with_connection(|conn| Ok(conn.is_autocommit())).unwrap());
    }

    #[test]
    fn test_transactions_run_on_their_own_connections() {
        let db = Db::open_in_memory().unwrap();
        setup(&db);

        let first = Arc::new(db.begin(&Context::background()).unwrap());
        let second = Arc::new(db.begin(&Context::background()).unwrap());
        assert_ne!(first.id(), second.id());
        assert!(db.owns(&first) && db.owns(&second));
        assert!(db.with_connection(|conn| Ok(conn.is_autocommit())).unwrap());

        let mut insert = first.new_insert();
        insert.table("kv").value("k", "a").value("v", "1");
        insert.exec().unwrap();
        first.commit().unwrap();
        second.rollback().unwrap();

        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_in_memory_databases_are_private() {
        let first = Db::open_in_memory().unwrap();
        let second = Db::open_in_memory().unwrap();
        setup(&first);

        assert_ne!(first.id(), second.id());
        let tx = first.begin(&Context::background()).unwrap();
        assert!(!second.owns(&tx));
        let missing = second.with_connection(|conn| {
            Ok(conn.query_row("SELECT count(*) FROM kv", [], |r| r.get::<_, i64>(0))?)
        });
        assert!(missing.is_err());
    }

    #[test]
    fn test_open_file_database_with_pragmas() {
        let file = NamedTempFile::new().unwrap();
        let config = DatabaseConfig {
            path: file.path().to_string_lossy().to_string(),
            journal_mode: Some("wal".to_string()),
            busy_timeout_ms: Some(250),
            ..Default::default()
        };
        let db = Db::open(&config).unwrap();
        let (fk, mode): (i64, String) = db
            .with_connection(|conn| {
                let fk = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
                let mode = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                Ok((fk, mode))
            })
            .unwrap();
        assert_eq!(fk, 1);
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_unknown_journal_mode() {
        let config = DatabaseConfig {
            journal_mode: Some("sideways".to_string()),
            ..Default::default()
        };
        match Db::open(&config) {
            Err(SqlweaveError::Config(msg)) => assert!(msg.contains("journal mode")),
            other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}
