//! # fisc-crypto: Cryptographic Primitives
//!
//! Provides the cryptographic building blocks of the fiscal engine:
//!
//! - **RSA-SHA1** (PKCS#1 v1.5) signing and verification of the canonical
//!   document signing input, with base64 signature encoding.
//! - **Key providers** that resolve versioned per-organization signing keys,
//!   with a vendor fallback. No key is ever embedded in source code.
//! - **Chain verification** that walks a series and reports the first
//!   broken link.
//! - **SHA-256** digests of exported audit files.
//!
//! ## Crate Policy
//!
//! - Depends only on `fisc-core` internally.
//! - No mocking of cryptographic operations in tests. All tests use real RSA
//!   keys (PEM fixtures) and real signatures.
//! - `Debug` never prints private key material.

pub mod chain;
pub mod error;
pub mod key_provider;
pub mod rsa_sha1;
pub mod sha256;

pub use chain::{verify_chain, verify_document, verify_link, ChainReport};
pub use error::CryptoError;
pub use key_provider::{DirectoryKeyProvider, KeyProvider, LocalKeyProvider, ScopedKey};
pub use rsa_sha1::{verify_base64, DocumentSignature, SigningKey, VerifyingKey};
pub use sha256::sha256_hex;
