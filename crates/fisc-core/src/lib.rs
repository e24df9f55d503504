//! # fisc-core: Foundational Types for the Fiscal Document Engine
//!
//! This crate is the leaf of the workspace. It defines the data model of a
//! fiscal document and the type-level guarantees the rest of the engine
//! relies on. Every other `fisc-*` crate depends on it; it depends on nothing
//! internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtypes for identifiers.** `DocumentId`, `OrganizationId`,
//!    `ProductId`, `TaxId`: no bare strings or UUIDs cross crate boundaries.
//!    `TaxId` can only be obtained through a validating constructor.
//!
//! 2. **`SigningInput` newtype.** The string that gets signed is produced
//!    exclusively by `SigningInput::new()` / `SigningInput::for_document()`.
//!    The signer accepts nothing else, so the field order, separators and
//!    decimal formatting cannot drift between signing and verification.
//!
//! 3. **Decimal money.** All amounts are `rust_decimal::Decimal`, rounded
//!    half-away-from-zero to two places at the line level. Floats never
//!    touch a total.
//!
//! 4. **Second-precision UTC timestamps.** `Timestamp` drops sub-seconds at
//!    construction so the system-entry date renders identically at signing
//!    time and at verification time.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `fisc-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod money;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::SigningInput;
pub use config::{FiscalConfig, SoftwareIdentity};
pub use document::{
    Address, Cancellation, Counterparty, DocumentLine, DocumentNumber, DocumentStatus,
    DocumentTotals, DocumentType, FiscalDocument, KeyOwner, LineAmounts, Organization,
    PaymentMethod, PaymentStatus, Series, SourceReference, StockDirection, TaxExemption,
};
pub use error::{FiscalError, ValidationError};
pub use identity::{DocumentId, LineId, OrganizationId, ProductId, TaxId};
pub use temporal::Timestamp;
