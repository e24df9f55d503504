//! Document persistence operations.
//!
//! All functions take a `&mut SqliteConnection` so they run inside the
//! caller's transaction. Documents and their lines are inserted once; the
//! only update is the conditional ISSUED → CANCELLED status write, which
//! names its columns explicitly. Database triggers reject every other
//! update and all deletes.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use fisc_core::temporal::{format_date, parse_date};
use fisc_core::{
    Address, Cancellation, Counterparty, DocumentId, DocumentLine, DocumentNumber,
    DocumentStatus, DocumentTotals, DocumentType, FiscalDocument, KeyOwner, LineId,
    OrganizationId, PaymentMethod, PaymentStatus, ProductId, Series, SourceReference,
    TaxExemption, TaxId, Timestamp,
};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::error::StoreError;

const DOCUMENT_COLUMNS: &str = "id, organization_id, document_type, series, sequence_number,
    document_number, issue_date, system_entry_date, due_date, customer_id, customer_name,
    customer_tax_id, customer_street, customer_city, customer_postal_code, customer_country,
    customer_phone, customer_email, subtotal, tax_amount, discount_amount, grand_total,
    signature, signature_key_version, signature_key_owner, status, cancellation_reason,
    cancelled_at, cancelled_by, source_document_id, source_document_number, source_reason,
    payment_method, payment_status, notes, created_by";

const LINE_COLUMNS: &str = "id, line_number, product_id, code, name, quantity,
    unit_price, tax_rate, exemption_code, exemption_reason, discount_amount, tax_amount,
    line_total, source_line_id";

// ─── Writes ──────────────────────────────────────────────────────────

/// Insert a document and all of its lines.
pub async fn insert(conn: &mut SqliteConnection, doc: &FiscalDocument) -> Result<(), StoreError> {
    let address = doc.counterparty.address.as_ref();
    sqlx::query(
        "INSERT INTO documents (id, organization_id, document_type, series, sequence_number,
         document_number, issue_date, system_entry_date, due_date, customer_id, customer_name,
         customer_tax_id, customer_street, customer_city, customer_postal_code, customer_country,
         customer_phone, customer_email, subtotal, tax_amount, discount_amount, grand_total,
         signature, signature_key_version, status, cancellation_reason, cancelled_at,
         cancelled_by, source_document_id, source_document_number, source_reason,
         payment_method, payment_status, notes, is_fiscal, created_by, signature_key_owner)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34,
         ?35, ?36, ?37)",
    )
    .bind(doc.id.to_string())
    .bind(doc.organization_id.to_string())
    .bind(doc.document_type.as_str())
    .bind(doc.series().key())
    .bind(i64::from(doc.sequence()))
    .bind(doc.number.to_string())
    .bind(format_date(doc.issue_date))
    .bind(doc.system_entry_date.to_iso8601())
    .bind(doc.due_date.map(format_date))
    .bind(doc.counterparty.customer_id.as_deref())
    .bind(&doc.counterparty.name)
    .bind(doc.counterparty.tax_id.as_ref().map(|t| t.as_str()))
    .bind(address.map(|a| a.street.as_str()))
    .bind(address.map(|a| a.city.as_str()))
    .bind(address.map(|a| a.postal_code.as_str()))
    .bind(address.map(|a| a.country.as_str()))
    .bind(doc.counterparty.phone.as_deref())
    .bind(doc.counterparty.email.as_deref())
    .bind(doc.totals.subtotal.to_string())
    .bind(doc.totals.tax.to_string())
    .bind(doc.totals.discount.to_string())
    .bind(doc.totals.grand_total.to_string())
    .bind(doc.signature.as_deref())
    .bind(doc.signature_key_version.map(i64::from))
    .bind(doc.status.as_str())
    .bind(doc.cancellation.as_ref().map(|c| c.reason.as_str()))
    .bind(doc.cancellation.as_ref().map(|c| c.cancelled_at.to_iso8601()))
    .bind(doc.cancellation.as_ref().map(|c| c.cancelled_by.as_str()))
    .bind(doc.source.as_ref().map(|s| s.document_id.to_string()))
    .bind(doc.source.as_ref().map(|s| s.document_number.to_string()))
    .bind(doc.source.as_ref().and_then(|s| s.reason.as_deref()))
    .bind(doc.payment_method.map(|m| m.code()))
    .bind(doc.payment_status.as_str())
    .bind(doc.notes.as_deref())
    .bind(doc.is_fiscal())
    .bind(&doc.created_by)
    .bind(doc.signature_key_owner.map(|o| o.as_str()))
    .execute(&mut *conn)
    .await?;

    for line in &doc.lines {
        insert_line(conn, &doc.id, line).await?;
    }
    Ok(())
}

async fn insert_line(
    conn: &mut SqliteConnection,
    document_id: &DocumentId,
    line: &DocumentLine,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO document_lines (id, document_id, line_number, product_id, code, name,
         quantity, unit_price, tax_rate, exemption_code, exemption_reason, discount_amount,
         tax_amount, line_total, source_line_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )
    .bind(line.id.to_string())
    .bind(document_id.to_string())
    .bind(i64::from(line.line_number))
    .bind(line.product_id.map(|p| p.to_string()))
    .bind(&line.code)
    .bind(&line.name)
    .bind(line.quantity.to_string())
    .bind(line.unit_price.to_string())
    .bind(line.tax_rate.to_string())
    .bind(line.exemption.as_ref().map(|e| e.code.as_str()))
    .bind(line.exemption.as_ref().map(|e| e.reason.as_str()))
    .bind(line.discount.to_string())
    .bind(line.tax_amount.to_string())
    .bind(line.line_total.to_string())
    .bind(line.source_line_id.map(|l| l.to_string()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Transition an issued document to CANCELLED.
///
/// Returns `false` when no row was updated: the document does not exist or
/// is no longer ISSUED.
pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    id: &DocumentId,
    cancellation: &Cancellation,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE documents
         SET status = 'CANCELLED', cancellation_reason = ?2, cancelled_at = ?3, cancelled_by = ?4
         WHERE id = ?1 AND status = 'ISSUED'",
    )
    .bind(id.to_string())
    .bind(&cancellation.reason)
    .bind(cancellation.cancelled_at.to_iso8601())
    .bind(&cancellation.cancelled_by)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// ─── Reads ───────────────────────────────────────────────────────────

/// Fetch a document with its lines.
pub async fn get(
    conn: &mut SqliteConnection,
    id: &DocumentId,
) -> Result<Option<FiscalDocument>, StoreError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
    let row = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(Some(load(conn, row).await?)),
        None => Ok(None),
    }
}

/// Fetch a document by organization and number.
pub async fn get_by_number(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    number: &DocumentNumber,
) -> Result<Option<FiscalDocument>, StoreError> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE organization_id = ?1 AND document_number = ?2"
    );
    let row = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(organization.to_string())
        .bind(number.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(Some(load(conn, row).await?)),
        None => Ok(None),
    }
}

/// The chain predecessor candidate of a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub sequence: u32,
    pub number: String,
    pub issue_date: NaiveDate,
    pub signature: Option<String>,
}

/// The most recent document of the same organization, series and type
/// below `sequence`.
pub async fn previous_in_series(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    series: &Series,
    sequence: u32,
) -> Result<Option<ChainLink>, StoreError> {
    let row = sqlx::query_as::<_, ChainLinkRow>(
        "SELECT sequence_number, document_number, issue_date, signature
         FROM documents
         WHERE organization_id = ?1 AND series = ?2 AND document_type = ?3
           AND sequence_number < ?4
         ORDER BY sequence_number DESC
         LIMIT 1",
    )
    .bind(organization.to_string())
    .bind(series.key())
    .bind(series.document_type.as_str())
    .bind(i64::from(sequence))
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| -> Result<ChainLink, StoreError> {
        Ok(ChainLink {
            sequence: u32::try_from(r.sequence_number)
                .map_err(|e| StoreError::corrupt("documents", e))?,
            number: r.document_number,
            issue_date: parse_date(&r.issue_date).map_err(|e| StoreError::corrupt("documents", e))?,
            signature: r.signature,
        })
    })
    .transpose()
}

/// Every document of a series, in sequence order.
pub async fn list_series(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    series: &Series,
) -> Result<Vec<FiscalDocument>, StoreError> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE organization_id = ?1 AND series = ?2
         ORDER BY sequence_number"
    );
    let rows = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(organization.to_string())
        .bind(series.key())
        .fetch_all(&mut *conn)
        .await?;
    load_all(conn, rows).await
}

/// Documents issued in `[start, end]`, ordered by type code, series and
/// sequence.
pub async fn list_period(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<FiscalDocument>, StoreError> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE organization_id = ?1 AND issue_date >= ?2 AND issue_date <= ?3
         ORDER BY series, sequence_number"
    );
    let rows = sqlx::query_as::<_, DocumentRow>(&sql)
        .bind(organization.to_string())
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&mut *conn)
        .await?;
    load_all(conn, rows).await
}

/// Series an organization has allocated numbers in.
pub async fn series_in_use(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
) -> Result<Vec<Series>, StoreError> {
    let keys: Vec<String> = sqlx::query_scalar(
        "SELECT series FROM document_series WHERE organization_id = ?1 ORDER BY series",
    )
    .bind(organization.to_string())
    .fetch_all(&mut *conn)
    .await?;
    keys.iter()
        .map(|k| Series::parse(k).map_err(|e| StoreError::corrupt("document_series", e)))
        .collect()
}

/// Non-cancelled documents derived from `source`.
pub async fn active_derivations(
    conn: &mut SqliteConnection,
    source: &DocumentId,
) -> Result<Vec<(DocumentType, String)>, StoreError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT document_type, document_number FROM documents
         WHERE source_document_id = ?1 AND status = 'ISSUED'
         ORDER BY document_number",
    )
    .bind(source.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(t, n)| {
            DocumentType::from_str(&t)
                .map(|t| (t, n))
                .map_err(|e| StoreError::corrupt("documents", e))
        })
        .collect()
}

/// Running totals already credited against one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreditedAmounts {
    pub quantity: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Amounts credited per source line by the non-cancelled credit notes of
/// `source`.
pub async fn credited_by_line(
    conn: &mut SqliteConnection,
    source: &DocumentId,
) -> Result<HashMap<LineId, CreditedAmounts>, StoreError> {
    let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        "SELECT l.source_line_id, l.quantity, l.discount_amount, l.tax_amount, l.line_total
         FROM document_lines l
         JOIN documents d ON d.id = l.document_id
         WHERE d.source_document_id = ?1
           AND d.document_type = 'CREDIT_NOTE'
           AND d.status = 'ISSUED'
           AND l.source_line_id IS NOT NULL",
    )
    .bind(source.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut credited: HashMap<LineId, CreditedAmounts> = HashMap::new();
    for (line_id, quantity, discount, tax, total) in rows {
        let line_id = LineId::parse(&line_id).map_err(|e| StoreError::corrupt("document_lines", e))?;
        let entry = credited.entry(line_id).or_default();
        entry.quantity += decimal("document_lines", &quantity)?;
        entry.discount += decimal("document_lines", &discount)?;
        entry.tax += decimal("document_lines", &tax)?;
        entry.total += decimal("document_lines", &total)?;
    }
    Ok(credited)
}

// ─── Row mapping ─────────────────────────────────────────────────────

async fn load(conn: &mut SqliteConnection, row: DocumentRow) -> Result<FiscalDocument, StoreError> {
    let sql = format!(
        "SELECT {LINE_COLUMNS} FROM document_lines WHERE document_id = ?1 ORDER BY line_number"
    );
    let lines = sqlx::query_as::<_, LineRow>(&sql)
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(LineRow::into_record)
        .collect::<Result<Vec<_>, _>>()?;
    row.into_record(lines)
}

async fn load_all(
    conn: &mut SqliteConnection,
    rows: Vec<DocumentRow>,
) -> Result<Vec<FiscalDocument>, StoreError> {
    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        docs.push(load(conn, row).await?);
    }
    Ok(docs)
}

fn decimal(table: &'static str, s: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|e| StoreError::corrupt(table, format!("bad decimal {s:?}: {e}")))
}

fn field<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::corrupt("documents", e))
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    organization_id: String,
    document_type: String,
    series: String,
    sequence_number: i64,
    document_number: String,
    issue_date: String,
    system_entry_date: String,
    due_date: Option<String>,
    customer_id: Option<String>,
    customer_name: String,
    customer_tax_id: Option<String>,
    customer_street: Option<String>,
    customer_city: Option<String>,
    customer_postal_code: Option<String>,
    customer_country: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    subtotal: String,
    tax_amount: String,
    discount_amount: String,
    grand_total: String,
    signature: Option<String>,
    signature_key_version: Option<i64>,
    signature_key_owner: Option<String>,
    status: String,
    cancellation_reason: Option<String>,
    cancelled_at: Option<String>,
    cancelled_by: Option<String>,
    source_document_id: Option<String>,
    source_document_number: Option<String>,
    source_reason: Option<String>,
    payment_method: Option<String>,
    payment_status: String,
    notes: Option<String>,
    created_by: String,
}

impl DocumentRow {
    fn into_record(self, lines: Vec<DocumentLine>) -> Result<FiscalDocument, StoreError> {
        let document_type = field(DocumentType::from_str(&self.document_type))?;
        let number = field(DocumentNumber::parse(&self.document_number))?;
        let series = field(Series::parse(&self.series))?;
        if number.series() != &series || i64::from(number.sequence()) != self.sequence_number {
            return Err(StoreError::corrupt(
                "documents",
                format!(
                    "number {} disagrees with series {} / sequence {}",
                    self.document_number, self.series, self.sequence_number
                ),
            ));
        }

        let address = if self.customer_street.is_some()
            || self.customer_city.is_some()
            || self.customer_postal_code.is_some()
            || self.customer_country.is_some()
        {
            Some(Address {
                street: self.customer_street.unwrap_or_default(),
                city: self.customer_city.unwrap_or_default(),
                postal_code: self.customer_postal_code.unwrap_or_default(),
                country: self.customer_country.unwrap_or_default(),
            })
        } else {
            None
        };

        let cancellation = match (self.cancellation_reason, self.cancelled_at, self.cancelled_by) {
            (Some(reason), Some(at), Some(by)) => Some(Cancellation {
                reason,
                cancelled_at: field(Timestamp::parse(&at))?,
                cancelled_by: by,
            }),
            _ => None,
        };

        let source = match (self.source_document_id, self.source_document_number) {
            (Some(id), Some(number)) => Some(SourceReference {
                document_id: field(DocumentId::parse(&id))?,
                document_number: field(DocumentNumber::parse(&number))?,
                reason: self.source_reason,
            }),
            _ => None,
        };

        Ok(FiscalDocument {
            id: field(DocumentId::parse(&self.id))?,
            organization_id: field(OrganizationId::parse(&self.organization_id))?,
            document_type,
            number,
            issue_date: field(parse_date(&self.issue_date))?,
            system_entry_date: field(Timestamp::parse(&self.system_entry_date))?,
            due_date: field(self.due_date.as_deref().map(parse_date).transpose())?,
            counterparty: Counterparty {
                customer_id: self.customer_id,
                name: self.customer_name,
                tax_id: self
                    .customer_tax_id
                    .as_deref()
                    .map(TaxId::parse)
                    .transpose()
                    .map_err(|e| StoreError::corrupt("documents", e))?,
                address,
                phone: self.customer_phone,
                email: self.customer_email,
            },
            lines,
            totals: DocumentTotals {
                subtotal: decimal("documents", &self.subtotal)?,
                tax: decimal("documents", &self.tax_amount)?,
                discount: decimal("documents", &self.discount_amount)?,
                grand_total: decimal("documents", &self.grand_total)?,
            },
            signature: self.signature,
            signature_key_version: self
                .signature_key_version
                .map(u32::try_from)
                .transpose()
                .map_err(|e| StoreError::corrupt("documents", e))?,
            signature_key_owner: field(
                self.signature_key_owner
                    .as_deref()
                    .map(KeyOwner::from_str)
                    .transpose(),
            )?,
            status: field(DocumentStatus::from_str(&self.status))?,
            cancellation,
            source,
            payment_method: self
                .payment_method
                .as_deref()
                .map(PaymentMethod::from_code)
                .transpose()
                .map_err(|e| StoreError::corrupt("documents", e))?,
            payment_status: field(PaymentStatus::from_str(&self.payment_status))?,
            notes: self.notes,
            created_by: self.created_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChainLinkRow {
    sequence_number: i64,
    document_number: String,
    issue_date: String,
    signature: Option<String>,
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct LineRow {
    id: String,
    line_number: i64,
    product_id: Option<String>,
    code: String,
    name: String,
    quantity: String,
    unit_price: String,
    tax_rate: String,
    exemption_code: Option<String>,
    exemption_reason: Option<String>,
    discount_amount: String,
    tax_amount: String,
    line_total: String,
    source_line_id: Option<String>,
}

impl LineRow {
    fn into_record(self) -> Result<DocumentLine, StoreError> {
        let corrupt = |e: fisc_core::ValidationError| StoreError::corrupt("document_lines", e);
        Ok(DocumentLine {
            id: LineId::parse(&self.id).map_err(corrupt)?,
            line_number: u32::try_from(self.line_number)
                .map_err(|e| StoreError::corrupt("document_lines", e))?,
            product_id: self
                .product_id
                .as_deref()
                .map(ProductId::parse)
                .transpose()
                .map_err(corrupt)?,
            code: self.code,
            name: self.name,
            quantity: decimal("document_lines", &self.quantity)?,
            unit_price: decimal("document_lines", &self.unit_price)?,
            tax_rate: decimal("document_lines", &self.tax_rate)?,
            exemption: match (self.exemption_code, self.exemption_reason) {
                (Some(code), Some(reason)) => Some(TaxExemption { code, reason }),
                _ => None,
            },
            discount: decimal("document_lines", &self.discount_amount)?,
            tax_amount: decimal("document_lines", &self.tax_amount)?,
            line_total: decimal("document_lines", &self.line_total)?,
            source_line_id: self
                .source_line_id
                .as_deref()
                .map(LineId::parse)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}
