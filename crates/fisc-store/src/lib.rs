//! # fisc-store: Persistence Gateway
//!
//! SQLite persistence for the fiscal engine via SQLx:
//!
//! - [`Store`]: connection pool, migrations and transactions with
//!   rollback-on-drop.
//! - [`sequence`]: the per-series counter row and its atomic allocation.
//! - [`documents`]: insertion, lookup, chain predecessor queries,
//!   credited-quantity tracking and the conditional cancellation update.
//! - [`organizations`]: tenant records.
//! - [`stock`]: the [`StockLedger`] seam and its SQLite implementation.
//!
//! Repository functions take `&mut SqliteConnection`; callers pass
//! `&mut *tx` so that everything one lifecycle operation writes commits or
//! rolls back together.

pub mod documents;
pub mod error;
pub mod organizations;
pub mod pool;
pub mod sequence;
pub mod stock;

pub use documents::{ChainLink, CreditedAmounts};
pub use error::StoreError;
pub use pool::{Store, DATABASE_URL_ENV};
pub use stock::{Product, SqliteStockLedger, StockLedger, StockMovement};

pub use sqlx::pool::PoolConnection;
pub use sqlx::{Sqlite, SqliteConnection, Transaction};
