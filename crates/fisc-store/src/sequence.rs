//! # Sequence Allocator
//!
//! Hands out the next number of a series with one atomic upsert on the
//! `document_series` counter row:
//!
//! ```sql
//! INSERT INTO document_series (organization_id, series, last_number)
//! VALUES (?, ?, 1)
//! ON CONFLICT (organization_id, series)
//! DO UPDATE SET last_number = last_number + 1
//! RETURNING last_number
//! ```
//!
//! The counter is never derived from `MAX(sequence_number)`, and the
//! increment belongs to the caller's transaction: if the issuance rolls
//! back, so does the increment, and the number is handed out again.
//!
//! The upsert is the first write of an issuing transaction, so it is the
//! point where concurrent writers queue on SQLite's write lock. A writer
//! that cannot get the lock within the busy timeout gets
//! [`StoreError::Busy`](crate::StoreError::Busy).

use fisc_core::{OrganizationId, Series};
use sqlx::SqliteConnection;

use crate::error::StoreError;

/// Allocate the next sequence number of `series` for `organization`.
pub async fn allocate(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    series: &Series,
) -> Result<u32, StoreError> {
    let next: i64 = sqlx::query_scalar(
        "INSERT INTO document_series (organization_id, series, last_number)
         VALUES (?1, ?2, 1)
         ON CONFLICT (organization_id, series)
         DO UPDATE SET last_number = last_number + 1
         RETURNING last_number",
    )
    .bind(organization.to_string())
    .bind(series.key())
    .fetch_one(&mut *conn)
    .await?;

    let next = u32::try_from(next)
        .map_err(|_| StoreError::corrupt("document_series", format!("counter out of range: {next}")))?;
    tracing::debug!(
        organization = %organization,
        series = %series,
        sequence = next,
        "allocated sequence number"
    );
    Ok(next)
}

/// Last committed number of `series` (0 when the series was never used).
pub async fn current(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    series: &Series,
) -> Result<u32, StoreError> {
    let last: Option<i64> = sqlx::query_scalar(
        "SELECT last_number FROM document_series
         WHERE organization_id = ?1 AND series = ?2",
    )
    .bind(organization.to_string())
    .bind(series.key())
    .fetch_optional(&mut *conn)
    .await?;

    match last {
        None => Ok(0),
        Some(n) => u32::try_from(n)
            .map_err(|_| StoreError::corrupt("document_series", format!("counter out of range: {n}"))),
    }
}
