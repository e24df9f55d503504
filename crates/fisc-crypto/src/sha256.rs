//! # SHA-256 File Digests
//!
//! Digests published next to exported audit files so a recipient can check
//! the file was not altered in transit.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
