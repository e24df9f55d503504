//! # Exporter
//!
//! Reads committed documents through the persistence gateway and turns them
//! into [`ExportedFile`]s. All reads of one export happen inside a single
//! transaction so the file reflects one consistent snapshot.

use std::collections::HashSet;

use chrono::NaiveDate;
use fisc_core::temporal::format_date;
use fisc_core::{DocumentId, DocumentType, FiscalConfig, FiscalDocument, Organization, OrganizationId};
use fisc_crypto::sha256_hex;
use fisc_store::{documents, organizations, SqliteConnection, Store};

use crate::error::{ExportError, Result};
use crate::model::{AuditFile, ExportRequest};

/// A serialized audit file ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub contents: String,
    /// Lowercase hex SHA-256 of `contents`.
    pub sha256: String,
}

impl ExportedFile {
    fn new(file_name: String, contents: String) -> Self {
        let sha256 = sha256_hex(contents.as_bytes());
        Self {
            file_name,
            contents,
            sha256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Exporter {
    store: Store,
    config: FiscalConfig,
}

impl Exporter {
    pub fn new(store: Store, config: FiscalConfig) -> Self {
        Self { store, config }
    }

    /// Assemble the audit file for a period without serializing it.
    pub async fn audit_file(&self, request: &ExportRequest) -> Result<AuditFile> {
        request.check_period()?;
        let mut tx = self.store.begin().await?;
        let company = load_organization(&mut *tx, &request.organization_id).await?;
        let docs =
            documents::list_period(&mut *tx, &request.organization_id, request.start, request.end)
                .await?;
        let converted = converted_proformas(&mut *tx, &docs).await?;
        tx.commit().await.map_err(fisc_store::StoreError::from)?;

        Ok(AuditFile::build(company, docs, &converted, request, &self.config))
    }

    /// Export every document of an organization issued in the requested
    /// period.
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportedFile> {
        let file = self.audit_file(request).await?;
        let contents = file.to_xml()?;
        let file_name = format!(
            "SAFT_{}_{}_{}.xml",
            file.header.company.tax_id,
            format_date(request.start),
            format_date(request.end)
        );
        tracing::info!(
            organization = %request.organization_id,
            start = %request.start,
            end = %request.end,
            entries = file.sales_invoices.number_of_entries,
            "audit file exported"
        );
        Ok(ExportedFile::new(file_name, contents))
    }

    /// Export a single document in the same schema, named after its type
    /// and number.
    pub async fn export_document(
        &self,
        id: &DocumentId,
        generated_on: NaiveDate,
    ) -> Result<ExportedFile> {
        let mut tx = self.store.begin().await?;
        let doc = documents::get(&mut *tx, id)
            .await?
            .ok_or_else(|| ExportError::NotFound {
                kind: "document",
                id: id.to_string(),
            })?;
        let company = load_organization(&mut *tx, &doc.organization_id).await?;
        let converted = converted_proformas(&mut *tx, std::slice::from_ref(&doc)).await?;
        tx.commit().await.map_err(fisc_store::StoreError::from)?;

        let request = ExportRequest {
            organization_id: doc.organization_id,
            start: doc.issue_date,
            end: doc.issue_date,
            generated_on,
            include_working_documents: !doc.is_fiscal(),
        };
        let file_name = doc.export_file_name();
        let file = AuditFile::build(company, vec![doc], &converted, &request, &self.config);
        let contents = file.to_xml()?;
        tracing::info!(document = %id, file = %file_name, "document exported");
        Ok(ExportedFile::new(file_name, contents))
    }
}

async fn load_organization(
    conn: &mut SqliteConnection,
    id: &OrganizationId,
) -> Result<Organization> {
    organizations::get(conn, id)
        .await?
        .ok_or_else(|| ExportError::NotFound {
            kind: "organization",
            id: id.to_string(),
        })
}

/// Proformas among `docs` with an invoice-receipt in force.
async fn converted_proformas(
    conn: &mut SqliteConnection,
    docs: &[FiscalDocument],
) -> Result<HashSet<DocumentId>> {
    let mut converted = HashSet::new();
    for doc in docs.iter().filter(|d| d.document_type == DocumentType::Proforma) {
        let derived = documents::active_derivations(conn, &doc.id).await?;
        if derived.iter().any(|(t, _)| *t == DocumentType::InvoiceReceipt) {
            converted.insert(doc.id);
        }
    }
    Ok(converted)
}
