//! # Canonical Signing Input
//!
//! This module defines `SigningInput`, the sole construction path for the
//! bytes a fiscal document signature is computed over.
//!
//! ## Security Invariant
//!
//! The signing input is the UTF-8 string
//!
//! ```text
//! IssueDate;SystemEntryDate;DocumentNumber;GrossTotal;PreviousSignature
//! ```
//!
//! with `IssueDate` as `YYYY-MM-DD`, `SystemEntryDate` as
//! `YYYY-MM-DDTHH:MM:SS`, `GrossTotal` with exactly two decimals and a bare
//! `;` between fields. `PreviousSignature` is the base64 signature of the
//! previous document in the series, or the empty string for the first one.
//!
//! `SigningInput` has a private inner field. The signer and the verifier both
//! accept only `&SigningInput`, so they cannot disagree about field order,
//! separators or decimal formatting.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::document::{DocumentNumber, FiscalDocument};
use crate::money::format_amount;
use crate::temporal::{format_date, Timestamp};

/// The exact string a document signature covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SigningInput(String);

impl SigningInput {
    /// Build the signing input from its five fields.
    pub fn new(
        issue_date: NaiveDate,
        system_entry: Timestamp,
        number: &DocumentNumber,
        gross_total: Decimal,
        previous_signature: &str,
    ) -> Self {
        Self(format!(
            "{};{};{};{};{}",
            format_date(issue_date),
            system_entry.to_entry_string(),
            number,
            format_amount(gross_total),
            previous_signature
        ))
    }

    /// Build the signing input for a stored document.
    pub fn for_document(document: &FiscalDocument, previous_signature: &str) -> Self {
        Self::new(
            document.issue_date,
            document.system_entry_date,
            &document.number,
            document.totals.grand_total,
            previous_signature,
        )
    }

    /// The rendered input.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes fed to the digest.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl AsRef<[u8]> for SigningInput {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for SigningInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
