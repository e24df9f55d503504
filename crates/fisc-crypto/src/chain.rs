//! # Signature Chain Verification
//!
//! Each fiscal document's signature covers the previous document's
//! signature, so a series forms a chain: altering, removing or inserting a
//! document breaks every later link. This module re-derives the signing
//! input of stored documents and checks each link.
//!
//! Verification reports the first broken link and never repairs anything.

use fisc_core::{FiscalDocument, FiscalError, Series, SigningInput};

use crate::key_provider::KeyProvider;
use crate::rsa_sha1::{verify_base64, VerifyingKey};

/// Check one document's signature given its predecessor's signature
/// (empty for the first document of a series).
pub fn verify_document(
    document: &FiscalDocument,
    previous_signature: &str,
    key: &VerifyingKey,
) -> bool {
    match document.signature.as_deref() {
        Some(signature) => {
            let input = SigningInput::for_document(document, previous_signature);
            verify_base64(key, &input, signature)
        }
        None => false,
    }
}

/// Check one link, resolving the key version recorded on the document.
pub fn verify_link<K: KeyProvider + ?Sized>(
    provider: &K,
    document: &FiscalDocument,
    previous_signature: &str,
) -> Result<(), FiscalError> {
    let broken = |reason: String| FiscalError::ChainIntegrity {
        document: document.number.to_string(),
        reason,
    };
    if document.signature.is_none() {
        return Err(broken("missing signature".into()));
    }
    let version = document
        .signature_key_version
        .ok_or_else(|| broken("missing signature key version".into()))?;
    let owner = document
        .signature_key_owner
        .ok_or_else(|| broken("missing signature key owner".into()))?;
    let key = provider.verifying_key(&document.organization_id, owner, version)?;
    if !verify_document(document, previous_signature, &key) {
        return Err(broken("signature mismatch".into()));
    }
    Ok(())
}

/// Outcome of a successful series walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub series: Series,
    /// Number of links checked.
    pub verified: u32,
    /// Signature of the last document, the head of the chain.
    pub head: Option<String>,
}

/// Walk a whole series in sequence order.
///
/// `documents` must be every document of one series of one organization,
/// sorted by sequence. Sequences must run 1, 2, 3, … without gaps.
pub fn verify_chain<K: KeyProvider + ?Sized>(
    provider: &K,
    series: Series,
    documents: &[FiscalDocument],
) -> Result<ChainReport, FiscalError> {
    let mut previous = String::new();
    let mut verified = 0u32;
    for (index, document) in documents.iter().enumerate() {
        let expected = index as u32 + 1;
        if document.series() != &series {
            return Err(FiscalError::ChainIntegrity {
                document: document.number.to_string(),
                reason: format!("document does not belong to series {series}"),
            });
        }
        if document.sequence() != expected {
            return Err(FiscalError::ChainIntegrity {
                document: document.number.to_string(),
                reason: format!("gap: expected sequence {expected}"),
            });
        }
        verify_link(provider, document, &previous)?;
        previous = document.signature.clone().unwrap_or_default();
        verified += 1;
    }
    tracing::debug!(series = %series, verified, "signature chain verified");
    Ok(ChainReport {
        series,
        verified,
        head: (!previous.is_empty()).then_some(previous),
    })
}
