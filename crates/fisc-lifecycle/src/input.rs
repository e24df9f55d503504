//! Request types accepted by [`DocumentService`](crate::DocumentService).
//!
//! These are plain serde structs so the CLI can read them from JSON files.
//! Amounts are decimals; a line's tax and total are always computed by the
//! engine, never taken from input.

use chrono::NaiveDate;
use fisc_core::{
    Counterparty, DocumentId, DocumentType, LineId, OrganizationId, PaymentMethod, ProductId,
    TaxExemption,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of a new document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    /// Catalog product, when the line moves stock.
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub code: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent, e.g. `23`.
    pub tax_rate: Decimal,
    #[serde(default)]
    pub exemption: Option<TaxExemption>,
    #[serde(default)]
    pub discount: Decimal,
}

/// Request to issue a new document of any type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDocumentInput {
    pub organization_id: OrganizationId,
    pub document_type: DocumentType,
    /// Defaults to today (UTC).
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Defaults to the anonymous final consumer.
    #[serde(default)]
    pub counterparty: Option<Counterparty>,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
    pub actor: String,
}

/// A source line to credit. `quantity: None` credits everything that
/// remains on the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSelection {
    pub source_line_id: LineId,
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

/// Request to derive a credit note from an issued sale document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteInput {
    pub source_id: DocumentId,
    pub lines: Vec<CreditSelection>,
    pub reason: String,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    pub actor: String,
}

/// Request to derive a debit note charging extra lines against a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitNoteInput {
    pub source_id: DocumentId,
    pub lines: Vec<LineInput>,
    pub reason: String,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    pub actor: String,
}

/// Request to convert an issued proforma into an invoice-receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionInput {
    pub proforma_id: DocumentId,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    /// Overrides the proforma's payment method.
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub actor: String,
}
