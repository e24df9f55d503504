//! # Audit File Model
//!
//! The content of one audit file, assembled from committed documents before
//! any XML is written. Assembly is pure: the same organization, documents
//! and request always produce the same [`AuditFile`], and therefore the same
//! bytes.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, NaiveDate};
use fisc_core::{
    Counterparty, DocumentId, DocumentType, FiscalConfig, FiscalDocument, Organization,
    SoftwareIdentity,
};
use rust_decimal::Decimal;

use crate::error::{ExportError, Result};

/// Parameters of a period export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub organization_id: fisc_core::OrganizationId,
    /// First issue date included.
    pub start: NaiveDate,
    /// Last issue date included.
    pub end: NaiveDate,
    /// Written as `DateCreated`; fixed by the caller so output is
    /// reproducible.
    pub generated_on: NaiveDate,
    /// Also export proformas as working documents.
    pub include_working_documents: bool,
}

impl ExportRequest {
    pub(crate) fn check_period(&self) -> Result<()> {
        if self.start > self.end {
            return Err(ExportError::InvalidPeriod {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub company: Organization,
    pub fiscal_year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub generated_on: NaiveDate,
    pub currency: String,
    pub tax_country_region: String,
    pub software: SoftwareIdentity,
}

/// A catalog entry derived from document lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductEntry {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesInvoices {
    pub number_of_entries: usize,
    /// Net total of non-cancelled credit notes.
    pub total_debit: Decimal,
    /// Net total of non-cancelled sales and debit notes.
    pub total_credit: Decimal,
    pub invoices: Vec<FiscalDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDocument {
    pub document: FiscalDocument,
    /// Converted into an invoice that is still in force.
    pub converted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDocuments {
    pub number_of_entries: usize,
    pub total_credit: Decimal,
    pub documents: Vec<WorkDocument>,
}

/// Everything one exported file contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFile {
    pub header: Header,
    pub customers: Vec<Counterparty>,
    pub products: Vec<ProductEntry>,
    pub sales_invoices: SalesInvoices,
    pub working_documents: Option<WorkingDocuments>,
}

impl AuditFile {
    /// Assemble an audit file.
    ///
    /// `documents` may be in any order and of any type; proformas are only
    /// kept when `include_working_documents` is set. `converted` lists the
    /// proformas with a conversion in force.
    pub fn build(
        company: Organization,
        documents: Vec<FiscalDocument>,
        converted: &HashSet<DocumentId>,
        request: &ExportRequest,
        config: &FiscalConfig,
    ) -> Self {
        let (mut invoices, mut proformas): (Vec<_>, Vec<_>) =
            documents.into_iter().partition(FiscalDocument::is_fiscal);
        sort_documents(&mut invoices);
        sort_documents(&mut proformas);
        if !request.include_working_documents {
            proformas.clear();
        }

        let referenced: Vec<&FiscalDocument> = invoices.iter().chain(proformas.iter()).collect();
        let customers = collect_customers(&referenced);
        let products = collect_products(&referenced);

        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        for doc in invoices.iter().filter(|d| !d.is_cancelled()) {
            if doc.document_type == DocumentType::CreditNote {
                total_debit += doc.totals.net_total();
            } else {
                total_credit += doc.totals.net_total();
            }
        }

        let working_documents = request.include_working_documents.then(|| WorkingDocuments {
            number_of_entries: proformas.len(),
            total_credit: proformas
                .iter()
                .filter(|d| !d.is_cancelled())
                .map(|d| d.totals.net_total())
                .sum(),
            documents: proformas
                .into_iter()
                .map(|document| WorkDocument {
                    converted: converted.contains(&document.id),
                    document,
                })
                .collect(),
        });

        Self {
            header: Header {
                company,
                fiscal_year: request.start.year(),
                start: request.start,
                end: request.end,
                generated_on: request.generated_on,
                currency: config.currency.clone(),
                tax_country_region: config.tax_country_region.clone(),
                software: config.software.clone(),
            },
            customers,
            products,
            sales_invoices: SalesInvoices {
                number_of_entries: invoices.len(),
                total_debit,
                total_credit,
                invoices,
            },
            working_documents,
        }
    }
}

/// Type code, then fiscal year, then sequence.
fn sort_documents(documents: &mut [FiscalDocument]) {
    documents.sort_by_key(|d| (d.document_type.code(), d.series().fiscal_year, d.sequence()));
}

/// Distinct customers by export id. The first document in export order
/// supplies the snapshot.
fn collect_customers(documents: &[&FiscalDocument]) -> Vec<Counterparty> {
    let mut customers: BTreeMap<String, Counterparty> = BTreeMap::new();
    for doc in documents {
        customers
            .entry(doc.counterparty.export_id())
            .or_insert_with(|| doc.counterparty.clone());
    }
    customers.into_values().collect()
}

fn collect_products(documents: &[&FiscalDocument]) -> Vec<ProductEntry> {
    let mut products: BTreeMap<String, ProductEntry> = BTreeMap::new();
    for line in documents.iter().flat_map(|d| d.lines.iter()) {
        products.entry(line.code.clone()).or_insert_with(|| ProductEntry {
            code: line.code.clone(),
            description: line.name.clone(),
        });
    }
    products.into_values().collect()
}
