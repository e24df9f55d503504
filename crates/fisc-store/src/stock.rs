//! # Stock Adjustment Service
//!
//! Issuing a sale moves stock out, a credit note moves it back in, and
//! cancelling a document records the compensating movement. Movements are
//! recorded through the [`StockLedger`] trait on the caller's connection, so
//! a failing movement rolls back the whole issuance or cancellation.
//!
//! The default [`SqliteStockLedger`] appends to `stock_movements` and
//! adjusts the running `products.stock_quantity`.

use std::future::Future;
use std::str::FromStr;

use fisc_core::{DocumentId, OrganizationId, ProductId, Timestamp};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;

/// One signed change to a product's stock level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    /// Negative for outbound, positive for inbound.
    pub delta: Decimal,
    pub reason: String,
    pub reference_document_id: Option<DocumentId>,
}

/// Records stock movements inside the caller's transaction.
pub trait StockLedger: Send + Sync {
    fn record_movement<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        movement: &'a StockMovement,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a;
}

/// Ledger backed by the `products` and `stock_movements` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStockLedger;

impl StockLedger for SqliteStockLedger {
    fn record_movement<'a>(
        &'a self,
        conn: &'a mut SqliteConnection,
        movement: &'a StockMovement,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        async move {
            let level = stock_level(&mut *conn, &movement.product_id)
                .await?
                .ok_or(StoreError::UnknownProduct(movement.product_id))?;

            sqlx::query(
                "INSERT INTO stock_movements (id, product_id, delta, reason,
                 reference_document_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(movement.product_id.to_string())
            .bind(movement.delta.to_string())
            .bind(&movement.reason)
            .bind(movement.reference_document_id.map(|d| d.to_string()))
            .bind(Timestamp::now().to_iso8601())
            .execute(&mut *conn)
            .await?;

            sqlx::query("UPDATE products SET stock_quantity = ?2 WHERE id = ?1")
                .bind(movement.product_id.to_string())
                .bind((level + movement.delta).to_string())
                .execute(&mut *conn)
                .await?;

            tracing::debug!(
                product = %movement.product_id,
                delta = %movement.delta,
                reason = %movement.reason,
                "stock movement recorded"
            );
            Ok(())
        }
    }
}

/// A product's stock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub organization_id: OrganizationId,
    pub code: String,
    pub name: String,
    pub stock_quantity: Decimal,
}

/// Register a product with an opening stock level, or rename it if it
/// already exists. The opening level only applies to new records.
pub async fn upsert_product(
    conn: &mut SqliteConnection,
    product: &Product,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO products (id, organization_id, code, name, stock_quantity)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (id) DO UPDATE SET code = excluded.code, name = excluded.name",
    )
    .bind(product.id.to_string())
    .bind(product.organization_id.to_string())
    .bind(&product.code)
    .bind(&product.name)
    .bind(product.stock_quantity.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Current stock level, `None` if the product has no stock record.
pub async fn stock_level(
    conn: &mut SqliteConnection,
    product: &ProductId,
) -> Result<Option<Decimal>, StoreError> {
    let level: Option<String> =
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
            .bind(product.to_string())
            .fetch_optional(&mut *conn)
            .await?;
    level
        .map(|l| Decimal::from_str(&l).map_err(|e| StoreError::corrupt("products", e)))
        .transpose()
}

/// Movements recorded against a document, oldest first.
pub async fn movements_for_document(
    conn: &mut SqliteConnection,
    document: &DocumentId,
) -> Result<Vec<StockMovement>, StoreError> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT product_id, delta, reason FROM stock_movements
         WHERE reference_document_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(document.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(product_id, delta, reason)| {
            Ok(StockMovement {
                product_id: ProductId::parse(&product_id)
                    .map_err(|e| StoreError::corrupt("stock_movements", e))?,
                delta: Decimal::from_str(&delta)
                    .map_err(|e| StoreError::corrupt("stock_movements", e))?,
                reason,
                reference_document_id: Some(*document),
            })
        })
        .collect()
}
