//! # Audit File Serialization
//!
//! Renders an [`AuditFile`] as XML with `quick-xml`. Elements are written in
//! a fixed order with two-space indentation; text goes through
//! [`BytesText::new`], which escapes `&`, `<`, `>`, `"` and `'`.
//!
//! Empty values are written as self-closing elements so the indenter never
//! has to place a closing tag on its own line.

use chrono::Datelike;
use fisc_core::money::{format_amount, format_percentage, format_quantity, format_unit_price};
use fisc_core::temporal::format_date;
use fisc_core::{Address, Counterparty, DocumentLine, DocumentType, FiscalDocument};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::model::{AuditFile, Header, ProductEntry, SalesInvoices, WorkDocument, WorkingDocuments};

pub const NAMESPACE: &str = "urn:OECD:StandardAuditFile-Tax:PT_1.04_01";
pub const AUDIT_FILE_VERSION: &str = "1.04_01";

/// Placeholder hash written for unsigned working documents.
const UNSIGNED_HASH: &str = "0";

impl AuditFile {
    /// Serialize to an XML document.
    pub fn to_xml(&self) -> Result<String> {
        let mut w = XmlWriter::new();
        w.declaration()?;
        w.open_with_namespace("AuditFile")?;
        write_header(&mut w, &self.header)?;

        w.open("MasterFiles")?;
        for customer in &self.customers {
            write_customer(&mut w, customer)?;
        }
        for product in &self.products {
            write_product(&mut w, product)?;
        }
        w.close("MasterFiles")?;

        w.open("SourceDocuments")?;
        write_sales_invoices(&mut w, &self.sales_invoices, &self.header.tax_country_region)?;
        if let Some(working) = &self.working_documents {
            write_working_documents(&mut w, working, &self.header.tax_country_region)?;
        }
        w.close("SourceDocuments")?;

        w.close("AuditFile")?;
        w.finish()
    }
}

// ─── Writer ─────────────────────────────────────────────────────────

struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn declaration(&mut self) -> Result<()> {
        self.inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn open_with_namespace(&mut self, name: &str) -> Result<()> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("xmlns", NAMESPACE));
        self.inner.write_event(Event::Start(start))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn field(&mut self, name: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            self.inner.write_event(Event::Empty(BytesStart::new(name)))?;
            return Ok(());
        }
        self.inner.write_event(Event::Start(BytesStart::new(name)))?;
        self.inner.write_event(Event::Text(BytesText::new(value)))?;
        self.inner.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes nothing when `value` is `None`.
    fn optional(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.field(name, v),
            None => Ok(()),
        }
    }

    fn finish(self) -> Result<String> {
        let mut bytes = self.inner.into_inner();
        bytes.push(b'\n');
        Ok(String::from_utf8(bytes)?)
    }
}

// ─── Header & master files ──────────────────────────────────────────

fn write_header(w: &mut XmlWriter, header: &Header) -> Result<()> {
    let company = &header.company;
    w.open("Header")?;
    w.field("AuditFileVersion", AUDIT_FILE_VERSION)?;
    w.field("CompanyID", company.tax_id.as_str())?;
    w.field("TaxRegistrationNumber", company.tax_id.as_str())?;
    w.field("TaxAccountingBasis", "F")?;
    w.field("CompanyName", &company.name)?;
    write_address(w, "CompanyAddress", &company.address)?;
    w.field("FiscalYear", &header.fiscal_year.to_string())?;
    w.field("StartDate", &format_date(header.start))?;
    w.field("EndDate", &format_date(header.end))?;
    w.field("CurrencyCode", &header.currency)?;
    w.field("DateCreated", &format_date(header.generated_on))?;
    w.field("TaxEntity", "Global")?;
    w.field("ProductCompanyTaxID", &header.software.producer_tax_id)?;
    w.field("SoftwareCertificateNumber", &header.software.certificate_number)?;
    w.field("ProductID", &header.software.product_id)?;
    w.field("ProductVersion", &header.software.product_version)?;
    w.close("Header")
}

fn write_address(w: &mut XmlWriter, element: &str, address: &Address) -> Result<()> {
    w.open(element)?;
    w.field("AddressDetail", &address.street)?;
    w.field("City", &address.city)?;
    w.field("PostalCode", &address.postal_code)?;
    w.field("Country", &address.country)?;
    w.close(element)
}

fn write_customer(w: &mut XmlWriter, customer: &Counterparty) -> Result<()> {
    let tax_id = customer
        .tax_id
        .as_ref()
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| fisc_core::TaxId::FINAL_CONSUMER.to_string());
    w.open("Customer")?;
    w.field("CustomerID", &customer.export_id())?;
    w.field("AccountID", "Desconhecido")?;
    w.field("CustomerTaxID", &tax_id)?;
    w.field("CompanyName", &customer.name)?;
    let address = customer.address.clone().unwrap_or_else(|| Address {
        street: "Desconhecido".into(),
        city: "Desconhecido".into(),
        postal_code: "0000-000".into(),
        country: "Desconhecido".into(),
    });
    write_address(w, "BillingAddress", &address)?;
    w.optional("Telephone", customer.phone.as_deref())?;
    w.optional("Email", customer.email.as_deref())?;
    w.field("SelfBillingIndicator", "0")?;
    w.close("Customer")
}

fn write_product(w: &mut XmlWriter, product: &ProductEntry) -> Result<()> {
    w.open("Product")?;
    w.field("ProductType", "P")?;
    w.field("ProductCode", &product.code)?;
    w.field("ProductDescription", &product.description)?;
    w.field("ProductNumberCode", &product.code)?;
    w.close("Product")
}

// ─── Source documents ───────────────────────────────────────────────

fn write_sales_invoices(w: &mut XmlWriter, sales: &SalesInvoices, region: &str) -> Result<()> {
    w.open("SalesInvoices")?;
    w.field("NumberOfEntries", &sales.number_of_entries.to_string())?;
    w.field("TotalDebit", &format_amount(sales.total_debit))?;
    w.field("TotalCredit", &format_amount(sales.total_credit))?;
    for doc in &sales.invoices {
        write_invoice(w, doc, region)?;
    }
    w.close("SalesInvoices")
}

fn write_invoice(w: &mut XmlWriter, doc: &FiscalDocument, region: &str) -> Result<()> {
    w.open("Invoice")?;
    w.field("InvoiceNo", &doc.number.to_string())?;
    let status = if doc.is_cancelled() { "A" } else { "N" };
    write_status(w, "DocumentStatus", "InvoiceStatus", doc, status)?;
    w.field("Hash", doc.signature.as_deref().unwrap_or(UNSIGNED_HASH))?;
    w.field(
        "HashControl",
        &doc.signature_key_version.map(|v| v.to_string()).unwrap_or_default(),
    )?;
    w.field("Period", &doc.issue_date.month().to_string())?;
    w.field("InvoiceDate", &format_date(doc.issue_date))?;
    w.field("InvoiceType", doc.document_type.code())?;
    w.open("SpecialRegimes")?;
    w.field("SelfBillingIndicator", "0")?;
    w.field("CashVATSchemeIndicator", "0")?;
    w.field("ThirdPartiesBillingIndicator", "0")?;
    w.close("SpecialRegimes")?;
    w.field("SourceID", &doc.created_by)?;
    w.field("SystemEntryDate", &doc.system_entry_date.to_entry_string())?;
    w.field("CustomerID", &doc.counterparty.export_id())?;
    for line in &doc.lines {
        write_line(w, doc, line, region)?;
    }
    write_totals(w, doc)?;
    w.close("Invoice")
}

fn write_working_documents(w: &mut XmlWriter, working: &WorkingDocuments, region: &str) -> Result<()> {
    w.open("WorkingDocuments")?;
    w.field("NumberOfEntries", &working.number_of_entries.to_string())?;
    w.field("TotalDebit", &format_amount(Decimal::ZERO))?;
    w.field("TotalCredit", &format_amount(working.total_credit))?;
    for work in &working.documents {
        write_work_document(w, work, region)?;
    }
    w.close("WorkingDocuments")
}

fn write_work_document(w: &mut XmlWriter, work: &WorkDocument, region: &str) -> Result<()> {
    let doc = &work.document;
    let status = match (doc.is_cancelled(), work.converted) {
        (true, _) => "A",
        (false, true) => "F",
        (false, false) => "N",
    };
    w.open("WorkDocument")?;
    w.field("DocumentNumber", &doc.number.to_string())?;
    write_status(w, "DocumentStatus", "WorkStatus", doc, status)?;
    w.field("Hash", UNSIGNED_HASH)?;
    w.field("Period", &doc.issue_date.month().to_string())?;
    w.field("WorkDate", &format_date(doc.issue_date))?;
    w.field("WorkType", doc.document_type.code())?;
    w.field("SourceID", &doc.created_by)?;
    w.field("SystemEntryDate", &doc.system_entry_date.to_entry_string())?;
    w.field("CustomerID", &doc.counterparty.export_id())?;
    for line in &doc.lines {
        write_line(w, doc, line, region)?;
    }
    write_totals(w, doc)?;
    w.close("WorkDocument")
}

/// Status block shared by invoices and working documents. The status date
/// is the cancellation time for cancelled documents, the system entry date
/// otherwise.
fn write_status(
    w: &mut XmlWriter,
    element: &str,
    status_element: &str,
    doc: &FiscalDocument,
    status: &str,
) -> Result<()> {
    let (date, reason, source_id) = match &doc.cancellation {
        Some(c) => (c.cancelled_at, Some(c.reason.as_str()), c.cancelled_by.as_str()),
        None => (doc.system_entry_date, None, doc.created_by.as_str()),
    };
    w.open(element)?;
    w.field(status_element, status)?;
    w.field(&format!("{status_element}Date"), &date.to_entry_string())?;
    w.optional("Reason", reason)?;
    w.field("SourceID", source_id)?;
    w.field("SourceBilling", "P")?;
    w.close(element)
}

fn write_line(
    w: &mut XmlWriter,
    doc: &FiscalDocument,
    line: &DocumentLine,
    region: &str,
) -> Result<()> {
    w.open("Line")?;
    w.field("LineNumber", &line.line_number.to_string())?;
    w.field("ProductCode", &line.code)?;
    w.field("ProductDescription", &line.name)?;
    w.field("Quantity", &format_quantity(line.quantity))?;
    w.field("UnitOfMeasure", "UN")?;
    w.field("UnitPrice", &format_unit_price(line.unit_price))?;
    w.field("TaxPointDate", &format_date(doc.issue_date))?;
    if let Some(source) = &doc.source {
        w.open("References")?;
        w.field("Reference", &source.document_number.to_string())?;
        w.optional("Reason", source.reason.as_deref())?;
        w.close("References")?;
    }
    w.field("Description", &line.name)?;
    let amount = format_amount(line.net_amount());
    if doc.document_type == DocumentType::CreditNote {
        w.field("DebitAmount", &amount)?;
    } else {
        w.field("CreditAmount", &amount)?;
    }
    w.open("Tax")?;
    w.field("TaxType", "IVA")?;
    w.field("TaxCountryRegion", region)?;
    w.field("TaxCode", tax_code(line))?;
    w.field("TaxPercentage", &format_percentage(line.tax_rate))?;
    w.close("Tax")?;
    if let Some(exemption) = &line.exemption {
        w.field("TaxExemptionReason", &exemption.reason)?;
        w.field("TaxExemptionCode", &exemption.code)?;
    }
    w.field("SettlementAmount", &format_amount(line.discount))?;
    w.close("Line")
}

fn write_totals(w: &mut XmlWriter, doc: &FiscalDocument) -> Result<()> {
    w.open("DocumentTotals")?;
    w.field("TaxPayable", &format_amount(doc.totals.tax))?;
    w.field("NetTotal", &format_amount(doc.totals.net_total()))?;
    w.field("GrossTotal", &format_amount(doc.totals.grand_total))?;
    w.close("DocumentTotals")
}

/// Rate bracket of a line: exempt, reduced, intermediate or normal.
fn tax_code(line: &DocumentLine) -> &'static str {
    if line.exemption.is_some() || line.tax_rate.is_zero() {
        "ISE"
    } else if line.tax_rate <= Decimal::from(6) {
        "RED"
    } else if line.tax_rate <= Decimal::from(13) {
        "INT"
    } else {
        "NOR"
    }
}
