//! # RSA-SHA1 Document Signatures
//!
//! RSA PKCS#1 v1.5 signatures over SHA-1 of the UTF-8 signing input. The
//! scheme is mandated by the fiscal authority and is not negotiable, which is
//! why a legacy digest appears here.
//!
//! ## Security Invariant
//!
//! `SigningKey::sign()` and `VerifyingKey::verify()` accept only
//! `&SigningInput`. Raw strings cannot be signed, so the signed bytes always
//! come out of the one canonical formatter.
//!
//! Signatures are stored and exchanged as base64 (standard alphabet,
//! padded). PKCS#1 v1.5 is deterministic: the same key and input always
//! produce the same signature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use fisc_core::SigningInput;

use crate::error::CryptoError;

/// A decoded document signature.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentSignature(Vec<u8>);

impl DocumentSignature {
    /// Decode a stored base64 signature.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| CryptoError::MalformedSignature(e.to_string()))
    }

    /// Encode for storage.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DocumentSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b64 = self.to_base64();
        let prefix: String = b64.chars().take(12).collect();
        write!(f, "DocumentSignature({prefix}...)")
    }
}

// ---------------------------------------------------------------------------
// Signing key
// ---------------------------------------------------------------------------

/// A versioned RSA private key.
///
/// Does not implement `Serialize`. The private key is only written out
/// through [`SigningKey::to_pkcs8_pem()`], which key stores call explicitly.
#[derive(Clone)]
pub struct SigningKey {
    key: RsaPrivateKey,
    version: u32,
}

impl SigningKey {
    pub fn new(key: RsaPrivateKey, version: u32) -> Self {
        Self { key, version }
    }

    /// Generate a fresh key pair with the OS CSPRNG.
    pub fn generate(bits: usize, version: u32) -> Result<Self, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        let key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::InvalidKey(format!("key generation failed: {e}")))?;
        Ok(Self { key, version })
    }

    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// PEM document.
    pub fn from_pem(pem: &str, version: u32) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|pkcs8_err| {
                RsaPrivateKey::from_pkcs1_pem(pem).map_err(|pkcs1_err| {
                    CryptoError::InvalidKey(format!(
                        "not a PKCS#8 ({pkcs8_err}) or PKCS#1 ({pkcs1_err}) RSA private key"
                    ))
                })
            })?;
        Ok(Self { key, version })
    }

    /// Encode the private key as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Key version recorded on every document this key signs.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            key: self.key.to_public_key(),
            version: self.version,
        }
    }

    /// Sign the canonical input of a document.
    pub fn sign(&self, input: &SigningInput) -> Result<DocumentSignature, CryptoError> {
        let signer = pkcs1v15::SigningKey::<Sha1>::new(self.key.clone());
        let signature = signer
            .try_sign(input.as_bytes())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(DocumentSignature(signature.to_vec()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(v{}, <private>)", self.version)
    }
}

// ---------------------------------------------------------------------------
// Verifying key
// ---------------------------------------------------------------------------

/// A versioned RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    key: RsaPublicKey,
    version: u32,
}

impl VerifyingKey {
    /// Parse an SPKI (`BEGIN PUBLIC KEY`) PEM document.
    pub fn from_public_pem(pem: &str, version: u32) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key, version })
    }

    pub fn to_public_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// `true` when `signature` is a valid RSA-SHA1 signature of `input`.
    pub fn verify(&self, input: &SigningInput, signature: &DocumentSignature) -> bool {
        let verifier = pkcs1v15::VerifyingKey::<Sha1>::new(self.key.clone());
        match pkcs1v15::Signature::try_from(signature.as_bytes()) {
            Ok(sig) => verifier.verify(input.as_bytes(), &sig).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey(v{})", self.version)
    }
}

/// Verify a stored base64 signature against the canonical input.
///
/// Returns `false` for undecodable signatures rather than an error: a
/// signature that cannot be decoded does not verify.
pub fn verify_base64(key: &VerifyingKey, input: &SigningInput, signature_b64: &str) -> bool {
    DocumentSignature::from_base64(signature_b64)
        .map(|sig| key.verify(input, &sig))
        .unwrap_or(false)
}
