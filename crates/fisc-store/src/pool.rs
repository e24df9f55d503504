//! # Connection Pool and Transactions
//!
//! `Store` owns the SQLite pool and hands out transactions. Repository
//! functions in this crate take `&mut SqliteConnection`, so callers run them
//! on `&mut *tx` and every multi-statement write shares one transaction.
//!
//! A transaction dropped without `commit()` rolls back. Any `?` between
//! `begin()` and `commit()` therefore leaves no trace in the database,
//! including the sequence counter increment.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, Transaction};

use crate::error::StoreError;

/// Environment variable naming the database URL.
pub const DATABASE_URL_ENV: &str = "FISC_DATABASE_URL";

/// How long a connection waits for another writer before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the fiscal database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and apply migrations.
    ///
    /// `url` is a `sqlite:` URL or a plain file path.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        tracing::info!(url, "connected to fiscal database");
        Self::from_pool(pool).await
    }

    /// A private in-memory database, for tests and dry runs.
    ///
    /// Uses a single connection that never expires, because every SQLite
    /// in-memory connection is a separate database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("database migrations applied");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A pooled connection for reads outside a transaction.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
