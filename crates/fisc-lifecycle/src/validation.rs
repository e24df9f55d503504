//! Input validation. Every rule here runs before the document is persisted;
//! a failure inside the issuing transaction rolls back the allocated number.

use chrono::NaiveDate;
use fisc_core::money::round_money;
use fisc_core::{
    Counterparty, DocumentLine, DocumentTotals, DocumentType, FiscalConfig, LineAmounts, LineId,
    Timestamp, ValidationError,
};
use fisc_store::ChainLink;
use rust_decimal::Decimal;

use crate::input::LineInput;

/// Validate `inputs` and compute their amounts.
pub fn build_lines(inputs: &[LineInput]) -> Result<Vec<DocumentLine>, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoLines);
    }
    inputs
        .iter()
        .zip(1u32..)
        .map(|(input, line_number)| build_line(line_number, input))
        .collect()
}

fn build_line(line_number: u32, input: &LineInput) -> Result<DocumentLine, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidLine {
        line: line_number,
        reason: reason.to_string(),
    };

    if input.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if input.quantity <= Decimal::ZERO {
        return Err(invalid("quantity must be positive"));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(invalid("unit price must not be negative"));
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate > Decimal::ONE_HUNDRED {
        return Err(invalid("tax rate must be between 0 and 100"));
    }
    if input.discount < Decimal::ZERO {
        return Err(invalid("discount must not be negative"));
    }
    if round_money(input.discount) > round_money(input.quantity * input.unit_price) {
        return Err(invalid("discount exceeds the line value"));
    }
    check_exemption(line_number, input.tax_rate, input.exemption.as_ref())?;

    let amounts = LineAmounts::compute(input.quantity, input.unit_price, input.discount, input.tax_rate);
    Ok(DocumentLine {
        id: LineId::new(),
        line_number,
        product_id: input.product_id,
        code: input.code.trim().to_string(),
        name: input.name.trim().to_string(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        tax_rate: input.tax_rate,
        exemption: input.exemption.clone(),
        discount: round_money(input.discount),
        tax_amount: amounts.tax,
        line_total: amounts.total,
        source_line_id: None,
    })
}

fn check_exemption(
    line: u32,
    tax_rate: Decimal,
    exemption: Option<&fisc_core::TaxExemption>,
) -> Result<(), ValidationError> {
    match exemption {
        None if tax_rate.is_zero() => Err(ValidationError::MissingExemption { line }),
        Some(e) if tax_rate.is_zero() && (e.code.trim().is_empty() || e.reason.trim().is_empty()) => {
            Err(ValidationError::MissingExemption { line })
        }
        Some(_) if !tax_rate.is_zero() => Err(ValidationError::InvalidLine {
            line,
            reason: "an exemption is only allowed on a zero-rated line".into(),
        }),
        _ => Ok(()),
    }
}

/// Counterparty and total rules that depend on the document type.
pub fn check_document(
    document_type: DocumentType,
    counterparty: &Counterparty,
    totals: &DocumentTotals,
    config: &FiscalConfig,
) -> Result<(), ValidationError> {
    if counterparty.name.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "counterparty.name",
            reason: "must not be empty".into(),
        });
    }
    if document_type == DocumentType::Invoice && counterparty.tax_id.is_none() {
        return Err(ValidationError::MissingCounterpartyTaxId);
    }
    if document_type == DocumentType::SimplifiedInvoice
        && totals.grand_total > config.simplified_invoice_ceiling
    {
        return Err(ValidationError::CeilingExceeded {
            total: totals.grand_total,
            ceiling: config.simplified_invoice_ceiling,
        });
    }
    Ok(())
}

/// An issue date may not be later than the system-entry date, nor earlier
/// than the issue date of the previous document of the series.
pub fn check_chronology(
    issue_date: NaiveDate,
    system_entry: Timestamp,
    previous: Option<&ChainLink>,
) -> Result<(), ValidationError> {
    if issue_date > system_entry.date() {
        return Err(ValidationError::ChronologyViolation {
            reason: format!(
                "issue date {issue_date} is after the system entry date {}",
                system_entry.date()
            ),
        });
    }
    if let Some(previous) = previous {
        if issue_date < previous.issue_date {
            return Err(ValidationError::ChronologyViolation {
                reason: format!(
                    "issue date {issue_date} precedes {} of {}",
                    previous.issue_date, previous.number
                ),
            });
        }
    }
    Ok(())
}

/// A cancellation or derivation reason, trimmed and required.
pub fn require_reason(reason: &str) -> Result<String, ValidationError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "reason",
            reason: "must not be empty".into(),
        });
    }
    Ok(reason.to_string())
}

/// The actor recorded on a document or cancellation.
pub fn require_actor(actor: &str) -> Result<String, ValidationError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(ValidationError::InvalidField {
            field: "actor",
            reason: "must not be empty".into(),
        });
    }
    Ok(actor.to_string())
}
