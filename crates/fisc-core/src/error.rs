//! # Error Types: Fiscal Error Taxonomy
//!
//! Defines the caller-facing error hierarchy of the engine. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Validation errors are raised before any mutation and name the offending
//!   field or line.
//! - Sequence conflicts are retried by the lifecycle manager and only reach
//!   the caller once retries are exhausted.
//! - Signing and chain-integrity errors fail loudly with the document number
//!   involved. They are never corrected automatically.
//! - Storage and stock errors from nested operations are carried as strings
//!   so this crate stays free of storage dependencies; the originating crate
//!   provides the `From` conversion.

use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level error type for document issuance, cancellation, derivation,
/// verification and export.
#[derive(Error, Debug)]
pub enum FiscalError {
    /// Input rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Concurrent allocation collided on the same series and the bounded
    /// retry budget was exhausted.
    #[error("sequence conflict on series {series} after {attempts} attempt(s)")]
    SequenceConflict {
        /// Series key, e.g. `FT/2025`.
        series: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Key unavailable, unparsable, or the signature primitive failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// A signature chain link does not verify or the series has a gap.
    #[error("chain integrity error at {document}: {reason}")]
    ChainIntegrity {
        /// Document number where the chain breaks.
        document: String,
        /// What is wrong with the link.
        reason: String,
    },

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of record (`document`, `organization`, ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The document lifecycle state machine rejected the transition.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Persistence gateway failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stock adjustment service failure.
    #[error("stock adjustment failed: {0}")]
    Stock(String),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FiscalError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the error is a retryable sequence allocation collision.
    pub fn is_sequence_conflict(&self) -> bool {
        matches!(self, Self::SequenceConflict { .. })
    }
}

/// Reasons a document input is rejected before any mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The tax identifier is not syntactically valid.
    #[error("invalid tax id {value:?}: {reason}")]
    InvalidTaxId {
        /// The rejected input.
        value: String,
        /// Which rule failed.
        reason: String,
    },

    /// Invoices must identify the counterparty by tax id.
    #[error("an invoice requires the counterparty tax id")]
    MissingCounterpartyTaxId,

    /// Simplified invoice above the legal ceiling.
    #[error("simplified invoice total {total} exceeds the legal ceiling of {ceiling}")]
    CeilingExceeded {
        /// Grand total of the rejected document.
        total: Decimal,
        /// Configured ceiling.
        ceiling: Decimal,
    },

    /// A document needs at least one line.
    #[error("a document must contain at least one line")]
    NoLines,

    /// A line failed an arithmetic or range rule.
    #[error("line {line}: {reason}")]
    InvalidLine {
        /// 1-based line number.
        line: u32,
        /// Which rule failed.
        reason: String,
    },

    /// Zero-rated lines must carry an exemption code and reason.
    #[error("line {line}: a zero tax rate requires an exemption code and reason")]
    MissingExemption {
        /// 1-based line number.
        line: u32,
    },

    /// The derivation source is missing, cancelled, non-fiscal or of the
    /// wrong type.
    #[error("invalid derivation source: {reason}")]
    InvalidSource {
        /// Why the source is not acceptable.
        reason: String,
    },

    /// The credited quantity or value exceeds what remains on the source line.
    #[error("source line {line}: requested {requested} exceeds remaining {remaining}")]
    OverCredit {
        /// Source line number.
        line: u32,
        /// Requested quantity.
        requested: Decimal,
        /// Quantity still creditable.
        remaining: Decimal,
    },

    /// Issue date out of chronological order within the series.
    #[error("chronology violation: {reason}")]
    ChronologyViolation {
        /// What is out of order.
        reason: String,
    },

    /// A scalar field is empty or malformed.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Which rule failed.
        reason: String,
    },
}
