//! # Fiscal Document Model
//!
//! Types shared by issuance, persistence, verification and export: document
//! types and their codes, series and numbers, counterparty snapshots, lines,
//! totals, cancellation records and source references.
//!
//! ## Numbering
//!
//! A series is `<type code>/<fiscal year>` (e.g. `FT/2025`). A document
//! number is `<series>/<sequence>` with the sequence zero-padded to six
//! digits (e.g. `FT/2025/000001`).
//!
//! ## Line arithmetic
//!
//! ```text
//! net   = round2(quantity × unit_price − discount)
//! tax   = round2(net × rate / 100)
//! total = net + tax
//! ```
//!
//! Document totals are sums over lines; `grand_total = subtotal − discount
//! + tax`, which equals the sum of the line totals.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{DocumentId, LineId, OrganizationId, ProductId, TaxId};
use crate::money::round_money;
use crate::temporal::Timestamp;

// ─── Document Type ──────────────────────────────────────────────────

/// Kind of fiscal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Invoice,
    InvoiceReceipt,
    SimplifiedInvoice,
    Proforma,
    CreditNote,
    DebitNote,
}

impl DocumentType {
    /// All document types, in audit-file order.
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Invoice,
        DocumentType::InvoiceReceipt,
        DocumentType::SimplifiedInvoice,
        DocumentType::Proforma,
        DocumentType::CreditNote,
        DocumentType::DebitNote,
    ];

    /// Two-letter type code used in series, numbers and the audit file.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invoice => "FT",
            Self::InvoiceReceipt => "FR",
            Self::SimplifiedInvoice => "FS",
            Self::Proforma => "PF",
            Self::CreditNote => "NC",
            Self::DebitNote => "ND",
        }
    }

    /// Parse a two-letter type code.
    pub fn from_code(code: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "document_type",
                reason: format!("unknown type code {code:?}"),
            })
    }

    /// Upper-snake-case name, as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "INVOICE",
            Self::InvoiceReceipt => "INVOICE_RECEIPT",
            Self::SimplifiedInvoice => "SIMPLIFIED_INVOICE",
            Self::Proforma => "PROFORMA",
            Self::CreditNote => "CREDIT_NOTE",
            Self::DebitNote => "DEBIT_NOTE",
        }
    }

    /// Fiscal documents are numbered, signed and chained. Proformas are not
    /// fiscal.
    pub fn is_fiscal(&self) -> bool {
        !matches!(self, Self::Proforma)
    }

    /// Sale types move stock out at issuance and may be credited or debited.
    pub fn is_sale(&self) -> bool {
        matches!(
            self,
            Self::Invoice | Self::InvoiceReceipt | Self::SimplifiedInvoice
        )
    }

    /// Stock effect of issuing this type, if any.
    pub fn stock_direction(&self) -> Option<StockDirection> {
        match self {
            Self::Invoice | Self::InvoiceReceipt | Self::SimplifiedInvoice => {
                Some(StockDirection::Outbound)
            }
            Self::CreditNote => Some(StockDirection::Inbound),
            Self::Proforma | Self::DebitNote => None,
        }
    }

    /// Payment status a freshly issued document of this type carries.
    pub fn default_payment_status(&self) -> PaymentStatus {
        match self {
            Self::InvoiceReceipt | Self::SimplifiedInvoice | Self::CreditNote => {
                PaymentStatus::Paid
            }
            Self::Invoice | Self::Proforma | Self::DebitNote => PaymentStatus::Pending,
        }
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.code() == s)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "document_type",
                reason: format!("unknown document type {s:?}"),
            })
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a stock movement caused by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockDirection {
    Outbound,
    Inbound,
}

impl StockDirection {
    /// Signed stock delta for a line quantity.
    pub fn delta(&self, quantity: Decimal) -> Decimal {
        match self {
            Self::Outbound => -quantity,
            Self::Inbound => quantity,
        }
    }
}

// ─── Series & Numbers ───────────────────────────────────────────────

/// A numbering series: one document type in one fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Series {
    pub document_type: DocumentType,
    pub fiscal_year: i32,
}

impl Series {
    pub fn new(document_type: DocumentType, fiscal_year: i32) -> Self {
        Self {
            document_type,
            fiscal_year,
        }
    }

    /// Series a document of `document_type` issued on `issue_date` belongs to.
    pub fn for_issue_date(document_type: DocumentType, issue_date: NaiveDate) -> Self {
        Self::new(document_type, issue_date.year())
    }

    /// Storage key, e.g. `FT/2025`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.document_type.code(), self.fiscal_year)
    }

    /// Parse a storage key.
    pub fn parse(key: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidField {
            field: "series",
            reason: format!("expected <type code>/<year>, got {key:?}"),
        };
        let (code, year) = key.split_once('/').ok_or_else(invalid)?;
        let document_type = DocumentType::from_code(code)?;
        let fiscal_year = year.parse::<i32>().map_err(|_| invalid())?;
        Ok(Self::new(document_type, fiscal_year))
    }
}

impl std::fmt::Display for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.document_type.code(), self.fiscal_year)
    }
}

/// A legally binding document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentNumber {
    series: Series,
    sequence: u32,
}

impl DocumentNumber {
    pub fn new(series: &Series, sequence: u32) -> Self {
        Self {
            series: *series,
            sequence,
        }
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Parse `FT/2025/000001`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidField {
            field: "document_number",
            reason: format!("expected <type code>/<year>/<sequence>, got {s:?}"),
        };
        let (series, sequence) = s.rsplit_once('/').ok_or_else(invalid)?;
        let series = Series::parse(series)?;
        let sequence = sequence.parse::<u32>().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(Self { series, sequence })
    }

    /// The number with `/` replaced by `-`, for file names.
    pub fn file_stem(&self) -> String {
        self.to_string().replace('/', "-")
    }
}

impl std::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:06}", self.series, self.sequence)
    }
}

impl Serialize for DocumentNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ─── Status & Payment ───────────────────────────────────────────────

/// Persisted status of a committed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Issued,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "ISSUED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISSUED" => Ok(Self::Issued),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(ValidationError::InvalidField {
                field: "status",
                reason: format!("unknown status {other:?}"),
            }),
        }
    }
}

/// How a document is (to be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Cheque,
    Other,
}

impl PaymentMethod {
    /// Audit-file mechanism code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cash => "NU",
            Self::Card => "CC",
            Self::BankTransfer => "TB",
            Self::Cheque => "CH",
            Self::Other => "OU",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ValidationError> {
        match code {
            "NU" => Ok(Self::Cash),
            "CC" => Ok(Self::Card),
            "TB" => Ok(Self::BankTransfer),
            "CH" => Ok(Self::Cheque),
            "OU" => Ok(Self::Other),
            other => Err(ValidationError::InvalidField {
                field: "payment_method",
                reason: format!("unknown payment method {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            other => Err(ValidationError::InvalidField {
                field: "payment_status",
                reason: format!("unknown payment status {other:?}"),
            }),
        }
    }
}

/// Key set a document signature was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyOwner {
    /// The issuing organization's own keys.
    Organization,
    /// The software producer's fallback keys.
    Vendor,
}

impl KeyOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "ORGANIZATION",
            Self::Vendor => "VENDOR",
        }
    }
}

impl FromStr for KeyOwner {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORGANIZATION" => Ok(Self::Organization),
            "VENDOR" => Ok(Self::Vendor),
            other => Err(ValidationError::InvalidField {
                field: "signature_key_owner",
                reason: format!("unknown key owner {other:?}"),
            }),
        }
    }
}

// ─── Parties ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Customer data copied onto the document at issuance. Later changes to the
/// customer record never alter a committed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    #[serde(default)]
    pub customer_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<TaxId>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Counterparty {
    /// Anonymous final consumer.
    pub fn final_consumer() -> Self {
        Self {
            customer_id: None,
            name: "Consumidor final".to_string(),
            tax_id: Some(TaxId::final_consumer()),
            address: None,
            phone: None,
            email: None,
        }
    }

    /// Identifier used for this counterparty in the audit file: the customer
    /// id when known, otherwise the tax id, otherwise the final-consumer
    /// number.
    pub fn export_id(&self) -> String {
        self.customer_id
            .clone()
            .or_else(|| self.tax_id.as_ref().map(|t| t.to_string()))
            .unwrap_or_else(|| TaxId::FINAL_CONSUMER.to_string())
    }
}

/// An issuing organization (tenant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub tax_id: TaxId,
    pub name: String,
    pub address: Address,
    pub fiscal_regime: String,
}

// ─── Lines & Totals ─────────────────────────────────────────────────

/// Exemption justification for a zero-rated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxExemption {
    pub code: String,
    pub reason: String,
}

/// Rounded monetary values of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    /// `round2(quantity × unit_price)`
    pub gross: Decimal,
    pub net: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl LineAmounts {
    pub fn compute(quantity: Decimal, unit_price: Decimal, discount: Decimal, tax_rate: Decimal) -> Self {
        let discount = round_money(discount);
        let gross = round_money(quantity * unit_price);
        let net = round_money(quantity * unit_price - discount);
        let tax = round_money(net * tax_rate / Decimal::ONE_HUNDRED);
        Self {
            gross,
            net,
            tax,
            total: net + tax,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: LineId,
    /// 1-based position within the document.
    pub line_number: u32,
    pub product_id: Option<ProductId>,
    pub code: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent, e.g. `23` for 23 %.
    pub tax_rate: Decimal,
    pub exemption: Option<TaxExemption>,
    pub discount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    /// For credit-note lines, the source line being credited.
    pub source_line_id: Option<LineId>,
}

impl DocumentLine {
    /// Line amount net of discount and before tax.
    pub fn net_amount(&self) -> Decimal {
        self.line_total - self.tax_amount
    }

    /// Line amount before discount and tax.
    pub fn gross_amount(&self) -> Decimal {
        self.net_amount() + self.discount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub grand_total: Decimal,
}

impl DocumentTotals {
    /// Sum already-rounded line values.
    pub fn from_lines(lines: &[DocumentLine]) -> Self {
        let mut totals = Self::default();
        for line in lines {
            totals.subtotal += line.gross_amount();
            totals.discount += line.discount;
            totals.tax += line.tax_amount;
        }
        totals.grand_total = totals.subtotal - totals.discount + totals.tax;
        totals
    }

    /// Total net of discount, before tax.
    pub fn net_total(&self) -> Decimal {
        self.subtotal - self.discount
    }
}

// ─── Document ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_at: Timestamp,
    pub cancelled_by: String,
}

/// Link from a derived document to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub document_id: DocumentId,
    pub document_number: DocumentNumber,
    /// Reason given for the derivation (credit/debit notes).
    pub reason: Option<String>,
}

/// A committed fiscal or working document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalDocument {
    pub id: DocumentId,
    pub organization_id: OrganizationId,
    pub document_type: DocumentType,
    pub number: DocumentNumber,
    pub issue_date: NaiveDate,
    pub system_entry_date: Timestamp,
    pub due_date: Option<NaiveDate>,
    pub counterparty: Counterparty,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    /// Base64 RSA-SHA1 signature, absent for non-fiscal documents.
    pub signature: Option<String>,
    pub signature_key_version: Option<u32>,
    /// Key set `signature_key_version` refers to.
    #[serde(default)]
    pub signature_key_owner: Option<KeyOwner>,
    pub status: DocumentStatus,
    pub cancellation: Option<Cancellation>,
    pub source: Option<SourceReference>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_by: String,
}

impl FiscalDocument {
    pub fn series(&self) -> &Series {
        self.number.series()
    }

    pub fn sequence(&self) -> u32 {
        self.number.sequence()
    }

    pub fn is_fiscal(&self) -> bool {
        self.document_type.is_fiscal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == DocumentStatus::Cancelled
    }

    /// `<TypeCode>_<number with / replaced by ->.xml`
    pub fn export_file_name(&self) -> String {
        format!("{}_{}.xml", self.document_type.code(), self.number.file_stem())
    }
}
