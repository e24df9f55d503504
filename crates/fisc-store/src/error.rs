//! # Storage Error Types
//!
//! Errors raised by the persistence gateway. SQLite lock contention
//! (`SQLITE_BUSY` / `SQLITE_LOCKED`, including their extended codes) is
//! classified separately so the lifecycle manager can retry it.

use fisc_core::{FiscalError, ProductId};
use thiserror::Error;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The database rejected or failed a statement.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Another connection holds the write lock.
    #[error("database busy: {0}")]
    Busy(String),

    /// Applying embedded migrations failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt {table} row: {reason}")]
    Corrupt {
        table: &'static str,
        reason: String,
    },

    /// A stock movement referenced a product without a stock record.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            table,
            reason: reason.to_string(),
        }
    }

    /// Whether the error is transient lock contention.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let busy = match &err {
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xFF, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            _ => false,
        };
        if busy {
            Self::Busy(err.to_string())
        } else {
            Self::Database(err)
        }
    }
}

impl From<StoreError> for FiscalError {
    fn from(err: StoreError) -> Self {
        match err {
            // The series is filled in by the retry loop that gives up.
            StoreError::Busy(_) => FiscalError::SequenceConflict {
                series: String::new(),
                attempts: 1,
            },
            StoreError::UnknownProduct(_) => FiscalError::Stock(err.to_string()),
            other => FiscalError::Storage(other.to_string()),
        }
    }
}
