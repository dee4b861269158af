/// Ambient Transaction Module
///
/// A transaction begun by the outermost [`in_tx`] call travels down the call
/// chain inside the [`Context`]. Nested calls find it there and join it; only
/// the frame that began it commits, rolls back, or reacts to a panic.

use crate::context::{Context, ContextKey};
use crate::core::{Result, SqlweaveError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Context slot holding the ambient transaction.
pub const TX_KEY: ContextKey = ContextKey::new("sqlweave.tx");

/// A source of transactions.
pub trait Database {
    type Tx: Transaction;

    /// Starts a new transaction.
    fn begin(&self, ctx: &Context) -> Result<Self::Tx>;

    /// Whether `tx` was begun by this database. An ambient transaction that
    /// belongs to another database is never joined.
    fn owns(&self, _tx: &Self::Tx) -> bool {
        true
    }
}

/// An open transaction that finishes exactly once.
pub trait Transaction: Any + Send + Sync {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Returns the ambient transaction, if the context carries one of type `T`.
pub fn tx_from_context<T>(ctx: &Context) -> Option<Arc<T>>
where
    T: Transaction,
{
    ctx.get::<T>(TX_KEY)
}

/// Derives a context carrying `tx`. `None` starts from a background context.
pub fn tx_to_context<T>(ctx: Option<&Context>, tx: Arc<T>) -> Context
where
    T: Transaction,
{
    let tx: Arc<dyn Any + Send + Sync> = tx;
    match ctx {
        Some(ctx) => ctx.with_shared(TX_KEY, tx),
        None => Context::background().with_shared(TX_KEY, tx),
    }
}

/// Runs `f` inside a transaction.
///
/// If `ctx` already carries a transaction that `db` [owns](Database::owns),
/// `f` runs with `ctx` unchanged and nothing is begun, committed or rolled
/// back here. Otherwise
/// this call begins a transaction, hands `f` a context carrying it, and then:
///
/// - commits when `f` succeeds, returning the commit error if that fails;
/// - rolls back when `f` fails, returning `f`'s error, or a
///   [`SqlweaveError::Rollback`] wrapping it when the rollback fails as well;
/// - rolls back when `f` panics and resumes the same panic.
///
/// # Examples
///
/// ```
/// use sqlweave::{in_tx, Context, Db, DbQuerier, Querier};
///
/// let db = Db::open_in_memory()?;
/// let querier = DbQuerier::new(db.clone());
/// in_tx(&Context::background(), &db, |ctx| {
///     let select = querier.new_select_query(ctx);
///     assert!(select.in_transaction());
///     Ok(())
/// })?;
/// # Ok::<(), sqlweave::SqlweaveError>(())
/// ```
pub fn in_tx<D, R, F>(ctx: &Context, db: &D, f: F) -> Result<R>
where
    D: Database,
    F: FnOnce(&Context) -> Result<R>,
{
    if let Some(ambient) = tx_from_context::<D::Tx>(ctx) {
        if db.owns(&ambient) {
            trace!("joining ambient transaction");
            return f(ctx);
        }
        debug!("ambient transaction belongs to another database; beginning a new one");
    }

    let tx = Arc::new(db.begin(ctx)?);
    let tx_ctx = tx_to_context(Some(ctx), tx.clone());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&tx_ctx)));
    drop(tx_ctx);

    match outcome {
        Ok(Ok(value)) => {
            tx.commit()?;
            Ok(value)
        }
        Ok(Err(err)) => match tx.rollback() {
            Ok(()) => Err(err),
            Err(rollback) => {
                warn!(error = %err, rollback_error = %rollback, "rollback after failed unit of work failed");
                Err(SqlweaveError::Rollback {
                    source: Box::new(err),
                    rollback: Box::new(rollback),
                })
            }
        },
        Err(payload) => {
            if let Err(rollback) = tx.rollback() {
                error!(error = %rollback, "rollback after panic failed");
            }
            panic::resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDb, MockTx};
    use std::error::Error as _;

    #[test]
    fn test_tx_from_context() {
        let ctx = Context::background();
        assert!(tx_from_context::<MockTx>(&ctx).is_none());

        let db = MockDb::new();
        let tx = Arc::new(db.begin(&ctx).unwrap());
        let ctx = tx_to_context(Some(&ctx), tx.clone());
        let found = tx_from_context::<MockTx>(&ctx).expect("transaction should be in context");
        assert!(Arc::ptr_eq(&found, &tx));

        let ctx = Context::background().with_value(TX_KEY, "not a transaction");
        assert!(tx_from_context::<MockTx>(&ctx).is_none());
    }

    #[test]
    fn test_tx_to_context_leaves_original_untouched() {
        let db = MockDb::new();
        let ctx = Context::background();
        let tx = Arc::new(db.begin(&ctx).unwrap());

        let derived = tx_to_context(Some(&ctx), tx.clone());
        assert!(tx_from_context::<MockTx>(&derived).is_some());
        assert!(tx_from_context::<MockTx>(&ctx).is_none());

        let fresh = tx_to_context(None, tx);
        assert!(tx_from_context::<MockTx>(&fresh).is_some());
    }

    #[test]
    fn test_successful_transaction_commits_once() {
        let db = MockDb::new();
        let mut calls = 0;
        let result = in_tx(&Context::background(), &db, |ctx| {
            calls += 1;
            assert!(tx_from_context::<MockTx>(ctx).is_some());
            Ok(7)
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
        assert_eq!(db.counts(), (1, 1, 0));
    }

    #[test]
    fn test_failed_unit_of_work_rolls_back() {
        let db = MockDb::new();
        let err = in_tx(&Context::background(), &db, |_| -> Result<()> {
            Err(SqlweaveError::App("test error".to_string()))
        })
        .unwrap_err();

        assert!(matches!(err, SqlweaveError::App(ref msg) if msg == "test error"));
        assert_eq!(db.counts(), (1, 0, 1));
    }

    #[test]
    fn test_failed_rollback_is_combined() {
        let db = MockDb::new().fail_rollback();
        let err = in_tx(&Context::background(), &db, |_| -> Result<()> {
            Err(SqlweaveError::App("test error".to_string()))
        })
        .unwrap_err();

        match &err {
            SqlweaveError::Rollback { source, rollback } => {
                assert!(matches!(**source, SqlweaveError::App(_)));
                assert!(rollback.to_string().contains("rollback refused"));
            }
            other => panic!("Expected Rollback error, got {:?}", other),
        }
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("Application error: test error"));
        assert!(matches!(err.original(), SqlweaveError::App(_)));
        assert_eq!(db.counts(), (1, 0, 1));
    }

    #[test]
    fn test_commit_failure_is_returned() {
        let db = MockDb::new().fail_commit();
        let err = in_tx(&Context::background(), &db, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("commit refused"));
        assert_eq!(db.counts(), (1, 1, 0));
    }

    #[test]
    fn test_begin_failure_skips_unit_of_work() {
        let db = MockDb::new().fail_begin();
        let mut called = false;
        let err = in_tx(&Context::background(), &db, |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();
        assert!(err.to_string().contains("begin refused"));
        assert!(!called);
        assert_eq!(db.counts(), (0, 0, 0));
    }

    #[test]
    fn test_nested_calls_share_one_transaction() {
        let db = MockDb::new();
        let mut inner_called = false;

        let result = in_tx(&Context::background(), &db, |outer_ctx| {
            let outer_tx = tx_from_context::<MockTx>(outer_ctx).unwrap();
            in_tx(outer_ctx, &db, |inner_ctx| {
                inner_called = true;
                let inner_tx = tx_from_context::<MockTx>(inner_ctx).unwrap();
                assert!(Arc::ptr_eq(&outer_tx, &inner_tx));
                Ok(())
            })
        });

        assert!(result.is_ok());
        assert!(inner_called);
        assert_eq!(db.counts(), (1, 1, 0));
    }

    #[test]
    fn test_nested_failure_rolls_back_at_root_only() {
        let db = MockDb::new();
        let result = in_tx(&Context::background(), &db, |ctx| {
            in_tx(ctx, &db, |_| -> Result<()> {
                Err(SqlweaveError::App("inner".to_string()))
            })
        });

        assert!(result.is_err());
        assert_eq!(db.counts(), (1, 0, 1));
    }

    #[test]
    fn test_panic_rolls_back_and_propagates() {
        let db = MockDb::new();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = in_tx(&Context::background(), &db, |_| -> Result<()> {
                panic!("test panic");
            });
        }));

        let payload = caught.expect_err("in_tx should propagate the panic");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"test panic"));
        assert_eq!(db.counts(), (1, 0, 1));
    }

    #[test]
    fn test_nested_panic_is_left_to_the_root() {
        let db = MockDb::new();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = in_tx(&Context::background(), &db, |ctx| {
                in_tx(ctx, &db, |_| -> Result<()> { panic!("inner panic") })
            });
        }));

        assert!(caught.is_err());
        assert_eq!(db.counts(), (1, 0, 1));
    }
}
