//! # Cryptographic Error Types
//!
//! Structured errors for key loading, signing and verification in
//! `fisc-crypto`. Every variant converts into `FiscalError::Signing`, which
//! aborts the enclosing issuance transaction.

use fisc_core::{FiscalError, OrganizationId};
use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// No key is registered for the organization (and no vendor fallback).
    #[error("no signing key for organization {organization}{}", version_suffix(.version))]
    KeyUnavailable {
        organization: OrganizationId,
        /// Requested version, `None` for "current".
        version: Option<u32>,
    },

    /// Key material could not be parsed.
    #[error("invalid RSA key: {0}")]
    InvalidKey(String),

    /// The RSA primitive failed.
    #[error("RSA-SHA1 signing failed: {0}")]
    SigningFailed(String),

    /// A stored signature is not valid base64 or has the wrong length.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Reading or writing a key file failed.
    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn version_suffix(version: &Option<u32>) -> String {
    version.map(|v| format!(" (version {v})")).unwrap_or_default()
}

impl From<CryptoError> for FiscalError {
    fn from(err: CryptoError) -> Self {
        FiscalError::Signing(err.to_string())
    }
}
