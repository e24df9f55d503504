//! # fisc-lifecycle: Document Lifecycle Manager
//!
//! Issues fiscal documents and keeps their signature chains intact:
//!
//! - **Issuance** allocates the next number of the series, links the
//!   document to its predecessor, signs it and persists it with its stock
//!   movements in one transaction.
//! - **Cancellation** reverses the document's stock movements and marks it
//!   cancelled. The signature, number and amounts are never touched.
//! - **Derivation** issues credit notes, debit notes and invoice-receipts
//!   from an existing issued document.
//! - **Verification** re-derives signing inputs from stored documents and
//!   checks each link.
//!
//! Documents are created through [`DocumentService`] only.

pub mod chain;
pub mod input;
mod retry;
pub mod service;
pub mod validation;

pub use chain::ChainPosition;
pub use input::{
    ConversionInput, CreateDocumentInput, CreditNoteInput, CreditSelection, DebitNoteInput,
    LineInput,
};
pub use service::DocumentService;
