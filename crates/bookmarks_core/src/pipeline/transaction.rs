//! Reentrant transaction scope middleware.
//!
//! # Responsibility
//! - Run the wrapped operation inside exactly one store transaction.
//! - Commit on success, roll back on failure, re-raise the original error.
//!
//! # Invariants
//! - Only the frame that enters at level 0 begins and commits; nested frames
//!   on the same instance join the open transaction.
//! - Any failure escaping `process`, including a panic unwinding through it,
//!   leaves the level at 0, and exactly one rollback is issued no matter how
//!   deep the failure started.
//! - Nesting state belongs to one instance; two instances over the same store
//!   never observe each other's level.
//! - The level lives in a `Cell`, so an instance is confined to one thread.

use crate::db::{DbError, TransactionOp};
use crate::pipeline::{Middleware, Next, PipelineError};
use log::{debug, warn};
use rusqlite::Connection;
use std::cell::Cell;
use std::rc::Rc;

/// Transaction control surface the middleware drives.
pub trait TransactionalStore {
    type Error;

    fn begin_transaction(&self) -> Result<(), Self::Error>;
    fn commit(&self) -> Result<(), Self::Error>;
    fn rollback(&self) -> Result<(), Self::Error>;
}

impl TransactionalStore for Connection {
    type Error = DbError;

    fn begin_transaction(&self) -> Result<(), DbError> {
        self.execute_batch("BEGIN IMMEDIATE;")
            .map_err(DbError::transaction(TransactionOp::Begin))
    }

    fn commit(&self) -> Result<(), DbError> {
        self.execute_batch("COMMIT;")
            .map_err(DbError::transaction(TransactionOp::Commit))
    }

    fn rollback(&self) -> Result<(), DbError> {
        self.execute_batch("ROLLBACK;")
            .map_err(DbError::transaction(TransactionOp::Rollback))
    }
}

impl<S: TransactionalStore + ?Sized> TransactionalStore for Rc<S> {
    type Error = S::Error;

    fn begin_transaction(&self) -> Result<(), S::Error> {
        (**self).begin_transaction()
    }

    fn commit(&self) -> Result<(), S::Error> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), S::Error> {
        (**self).rollback()
    }
}

impl<S: TransactionalStore + ?Sized> TransactionalStore for &S {
    type Error = S::Error;

    fn begin_transaction(&self) -> Result<(), S::Error> {
        (**self).begin_transaction()
    }

    fn commit(&self) -> Result<(), S::Error> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), S::Error> {
        (**self).rollback()
    }
}

/// Middleware that scopes an operation to one store transaction.
///
/// Share one instance (via `Rc`) across every pipeline that belongs to the
/// same unit of work; nested runs then flatten into a single transaction.
pub struct TransactionMiddleware<S> {
    store: S,
    level: Cell<usize>,
}

impl<S: TransactionalStore> TransactionMiddleware<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            level: Cell::new(0),
        }
    }

    /// Current nesting depth; 0 when no transaction is open.
    pub fn level(&self) -> usize {
        self.level.get()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn finish<E>(&self) -> Result<(), E>
    where
        E: From<S::Error> + From<PipelineError>,
    {
        let level = self.level.get();
        if level == 0 {
            // A nested frame failed, rolled back and reset the level, but the
            // error was swallowed before reaching this frame.
            warn!("event=tx_commit module=pipeline status=error error_code=tx_aborted");
            return Err(PipelineError::TransactionAborted.into());
        }

        // Commit before leaving level 1 so a failed commit still rolls back.
        if level == 1 {
            self.store.commit()?;
            debug!("event=tx_commit module=pipeline status=ok");
        }
        self.level.set(level - 1);
        Ok(())
    }

    fn abort<E>(&self, err: E) -> E
    where
        E: From<S::Error>,
    {
        if self.level.replace(0) == 0 {
            return err;
        }

        match self.store.rollback() {
            Ok(()) => {
                debug!("event=tx_rollback module=pipeline status=ok");
                err
            }
            Err(rollback_err) => {
                warn!("event=tx_rollback module=pipeline status=error error_code=rollback_failed");
                E::from(rollback_err)
            }
        }
    }
}

/// Resets the level and rolls back when `next` unwinds instead of returning.
struct UnwindReset<'a, S: TransactionalStore> {
    scope: &'a TransactionMiddleware<S>,
    armed: bool,
}

impl<S: TransactionalStore> Drop for UnwindReset<'_, S> {
    fn drop(&mut self) {
        if !self.armed || self.scope.level.replace(0) == 0 {
            return;
        }
        match self.scope.store.rollback() {
            Ok(()) => warn!("event=tx_rollback module=pipeline status=ok reason=panic"),
            Err(_) => warn!(
                "event=tx_rollback module=pipeline status=error reason=panic error_code=rollback_failed"
            ),
        }
    }
}

impl<I, O, E, S> Middleware<I, O, E> for TransactionMiddleware<S>
where
    S: TransactionalStore,
    E: From<S::Error> + From<PipelineError>,
{
    fn process(&self, data: Option<I>, next: &mut Next<'_, I, O, E>) -> Result<Option<O>, E> {
        let level = self.level.get();
        if level == 0 {
            self.store.begin_transaction()?;
            debug!("event=tx_begin module=pipeline status=ok");
        }
        self.level.set(level + 1);

        let mut reset = UnwindReset {
            scope: self,
            armed: true,
        };
        let outcome = next.run(data);
        reset.armed = false;

        match outcome {
            Ok(output) => match self.finish::<E>() {
                Ok(()) => Ok(output),
                Err(err) => Err(self.abort(err)),
            },
            Err(err) => Err(self.abort(err)),
        }
    }
}
