/// # Test Utilities Module
///
/// Shared fixtures for unit tests:
/// - a scripted [`MockDb`]/[`MockTx`] pair that counts lifecycle calls and can
///   be told to fail any of them
/// - an in-memory SQLite database with a small sample schema, shared by the
///   query and predicate tests
/// - one-time tracing setup so `RUST_LOG` output shows up under `cargo test`
use crate::context::Context;
use crate::core::db::Db;
use crate::core::{Result, SqlweaveError};
use crate::tx::{Database, Transaction};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

/// Installs the test tracing subscriber once per process.
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

#[derive(Debug, Default)]
struct Counters {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Transaction source with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct MockDb {
    counters: Arc<Counters>,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

impl MockDb {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    pub fn fail_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// `(begins, commits, rollbacks)`; commit and rollback count attempts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.counters.begins.load(Ordering::SeqCst),
            self.counters.commits.load(Ordering::SeqCst),
            self.counters.rollbacks.load(Ordering::SeqCst),
        )
    }
}

impl Database for MockDb {
    type Tx = MockTx;

    fn begin(&self, _ctx: &Context) -> Result<MockTx> {
        if self.fail_begin {
            return Err(SqlweaveError::Transaction("begin refused".to_string()));
        }
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        Ok(MockTx {
            counters: self.counters.clone(),
            fail_commit: self.fail_commit,
            fail_rollback: self.fail_rollback,
        })
    }
}

#[derive(Debug)]
pub struct MockTx {
    counters: Arc<Counters>,
    fail_commit: bool,
    fail_rollback: bool,
}

impl Transaction for MockTx {
    fn commit(&self) -> Result<()> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit {
            return Err(SqlweaveError::Transaction("commit refused".to_string()));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(SqlweaveError::Transaction("rollback refused".to_string()));
        }
        Ok(())
    }
}

/// In-memory database with `users` (soft-deleting, flags, JSON profile)
/// and `posts`.
pub fn sample_db() -> Result<Db> {
    init_tracing();
    let db = Db::open_in_memory()?;
    db.with_connection(|conn| {
        conn.execute_batch(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0,
                profile TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                title TEXT NOT NULL
            );

            INSERT INTO users (username, email, flags, profile, created_at, updated_at, deleted_at) VALUES
                ('alice', 'alice@example.com', 1,
                 '{"location": "New York", "tags": [{"name": "rust"}, {"name": "go"}]}',
                 '2024-01-01 00:00:00.000', '2024-02-01 00:00:00.000', NULL),
                ('bob', 'bob@example.com', 3,
                 '{"location": "San Francisco", "tags": [{"name": "python"}]}',
                 '2024-01-02 00:00:00.000', '2024-02-02 00:00:00.000', NULL),
                ('charlie', 'charlie@example.com', 2,
                 '{"location": "London", "tags": []}',
                 '2024-01-03 00:00:00.000', '2024-02-03 00:00:00.000', '2024-03-01 00:00:00.000');

            INSERT INTO posts (user_id, title) VALUES
                (1, 'Welcome to Rust'),
                (2, 'My Trip to Paris'),
                (1, 'Building Query Builders');
            "#,
        )?;
        Ok(())
    })?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_counts_attempts() {
        let db = MockDb::new().fail_commit();
        let tx = db.begin(&Context::background()).unwrap();
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_ok());
        assert_eq!(db.counts(), (1, 1, 1));
    }
}
