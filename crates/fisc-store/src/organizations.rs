//! Organization (tenant) persistence. Organizations are created once and
//! never deleted; documents reference them by id.

use fisc_core::{Address, Organization, OrganizationId, TaxId, Timestamp};
use sqlx::SqliteConnection;

use crate::error::StoreError;

/// Insert a new organization.
pub async fn insert(conn: &mut SqliteConnection, org: &Organization) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO organizations (id, tax_id, name, street, city, postal_code,
         country, fiscal_regime, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(org.id.to_string())
    .bind(org.tax_id.as_str())
    .bind(&org.name)
    .bind(&org.address.street)
    .bind(&org.address.city)
    .bind(&org.address.postal_code)
    .bind(&org.address.country)
    .bind(&org.fiscal_regime)
    .bind(Timestamp::now().to_iso8601())
    .execute(&mut *conn)
    .await?;

    tracing::info!(organization = %org.id, tax_id = %org.tax_id, "organization registered");
    Ok(())
}

/// Fetch an organization by id.
pub async fn get(
    conn: &mut SqliteConnection,
    id: &OrganizationId,
) -> Result<Option<Organization>, StoreError> {
    let row = sqlx::query_as::<_, OrganizationRow>(
        "SELECT id, tax_id, name, street, city, postal_code, country, fiscal_regime
         FROM organizations WHERE id = ?1",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(OrganizationRow::into_record).transpose()
}

/// All organizations, ordered by name.
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Organization>, StoreError> {
    let rows = sqlx::query_as::<_, OrganizationRow>(
        "SELECT id, tax_id, name, street, city, postal_code, country, fiscal_regime
         FROM organizations ORDER BY name, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(OrganizationRow::into_record).collect()
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    tax_id: String,
    name: String,
    street: String,
    city: String,
    postal_code: String,
    country: String,
    fiscal_regime: String,
}

impl OrganizationRow {
    fn into_record(self) -> Result<Organization, StoreError> {
        Ok(Organization {
            id: OrganizationId::parse(&self.id).map_err(|e| StoreError::corrupt("organizations", e))?,
            tax_id: TaxId::parse(&self.tax_id).map_err(|e| StoreError::corrupt("organizations", e))?,
            name: self.name,
            address: Address {
                street: self.street,
                city: self.city,
                postal_code: self.postal_code,
                country: self.country,
            },
            fiscal_regime: self.fiscal_regime,
        })
    }
}
