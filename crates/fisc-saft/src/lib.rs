//! # fisc-saft: Audit File Exporter
//!
//! Produces SAF-T style XML audit files from committed documents:
//!
//! - a period export for one organization, with a header, the customers and
//!   products its documents reference, every fiscal document of the period
//!   and optionally the proformas as working documents;
//! - a per-document export in the same schema.
//!
//! Output is deterministic. The creation date comes from the request and
//! documents are ordered by type code, fiscal year and sequence, so the same
//! data exported twice yields byte-identical files with the same SHA-256.

pub mod error;
pub mod export;
pub mod model;
pub mod xml;

pub use error::ExportError;
pub use export::{ExportedFile, Exporter};
pub use model::{AuditFile, ExportRequest};
