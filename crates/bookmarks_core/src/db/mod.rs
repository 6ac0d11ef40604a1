//! SQLite storage for the bookmark store.
//!
//! # Responsibility
//! - Open connections with foreign keys, busy timeout and current schema.
//! - Classify storage failures: plain SQL, schema version, or transaction
//!   control issued by the pipeline's transaction scope.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - A connection is handed out only after migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Transaction-control statement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

impl TransactionOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

impl Display for TransactionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// `BEGIN`, `COMMIT` or `ROLLBACK` was rejected by SQLite.
    Transaction {
        op: TransactionOp,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Wraps a failure raised while running `op`.
    pub fn transaction(op: TransactionOp) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Transaction { op, source }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Transaction { op, source } => {
                write!(f, "transaction {op} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "bookmark database is at schema {db_version}, this build supports up to {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Transaction { source: err, .. } => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
