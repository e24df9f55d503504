//! # Hash-Chain Builder
//!
//! Links a new fiscal document to its predecessor and signs it.
//!
//! The predecessor is the most recent document of the same organization,
//! series and type below the allocated sequence number. Because numbers are
//! contiguous, the predecessor of sequence `n` must be sequence `n - 1`; an
//! empty result is only valid for sequence 1. Anything else is reported as a
//! chain integrity error and the issuing transaction rolls back.

use fisc_core::{FiscalDocument, FiscalError, OrganizationId, Series, SigningInput};
use fisc_crypto::KeyProvider;
use fisc_store::{documents, ChainLink, SqliteConnection};

/// The link a new document chains onto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainPosition {
    /// Predecessor, `None` for the first document of a series.
    pub previous: Option<ChainLink>,
}

impl ChainPosition {
    /// Signature the new document covers; empty at the head of a series.
    pub fn previous_signature(&self) -> &str {
        self.previous
            .as_ref()
            .and_then(|link| link.signature.as_deref())
            .unwrap_or("")
    }
}

/// Resolve the predecessor of `sequence` inside the caller's transaction.
pub async fn locate(
    conn: &mut SqliteConnection,
    organization: &OrganizationId,
    series: &Series,
    sequence: u32,
) -> Result<ChainPosition, FiscalError> {
    let number = fisc_core::DocumentNumber::new(series, sequence);
    let previous = documents::previous_in_series(conn, organization, series, sequence).await?;

    match &previous {
        None if sequence == 1 => {}
        None => {
            return Err(FiscalError::ChainIntegrity {
                document: number.to_string(),
                reason: format!("gap: no document found before sequence {sequence}"),
            })
        }
        Some(link) if link.sequence + 1 != sequence => {
            return Err(FiscalError::ChainIntegrity {
                document: number.to_string(),
                reason: format!("gap: previous document is {}", link.number),
            })
        }
        Some(link) if link.signature.is_none() => {
            return Err(FiscalError::ChainIntegrity {
                document: number.to_string(),
                reason: format!("previous document {} is unsigned", link.number),
            })
        }
        Some(_) => {}
    }
    Ok(ChainPosition { previous })
}

/// Sign `document` over its canonical input with the organization's current
/// key and record the key version and key set on it.
pub fn sign<K: KeyProvider + ?Sized>(
    keys: &K,
    document: &mut FiscalDocument,
    position: &ChainPosition,
) -> Result<(), FiscalError> {
    let key = keys.signing_key(&document.organization_id, None)?;
    let input = SigningInput::for_document(document, position.previous_signature());
    let signature = key.sign(&input)?;

    document.signature = Some(signature.to_base64());
    document.signature_key_version = Some(key.version());
    document.signature_key_owner = Some(key.owner);

    tracing::debug!(
        document = %document.number,
        key_version = key.version(),
        key_owner = key.owner.as_str(),
        provider = keys.provider_name(),
        chained = position.previous.is_some(),
        "document signed"
    );
    Ok(())
}
