//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers of the fiscal engine. You cannot
//! pass a `ProductId` where a `DocumentId` is expected, and a `TaxId` only
//! exists once its check digit has been verified.
//!
//! ## Tax identifiers
//!
//! Tax identifiers are 9-digit numbers whose last digit is a mod-11 check
//! digit over the first eight (weights 9 down to 2). A two-letter `PT`
//! country prefix and embedded whitespace are accepted on input and dropped
//! from the stored value. `999999990` is the reserved final-consumer number
//! used when a sale is not attributed to an identified customer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Implements `Deserialize` by routing through the validating constructor,
/// so deserialized values satisfy the same invariants as constructed ones.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// UUID-backed identifiers are valid by construction.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Parse the hyphenated UUID form.
            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| ValidationError::InvalidField {
                        field: stringify!($ty),
                        reason: e.to_string(),
                    })
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier of a fiscal document.
    DocumentId
);

uuid_identifier!(
    /// Unique identifier of a document line.
    LineId
);

uuid_identifier!(
    /// Unique identifier of an organization (tenant).
    OrganizationId
);

uuid_identifier!(
    /// Reference to a catalog product. The catalog itself is external.
    ProductId
);

/// A validated 9-digit tax identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaxId(String);

impl_validating_deserialize!(TaxId);

impl TaxId {
    /// The reserved number for unidentified final consumers.
    pub const FINAL_CONSUMER: &'static str = "999999990";

    /// Parse and validate a tax identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTaxId`] when the value is not nine
    /// digits after normalization, starts with zero, or fails the check digit.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = compact
            .strip_prefix("PT")
            .or_else(|| compact.strip_prefix("pt"))
            .unwrap_or(&compact);

        let invalid = |reason: &str| ValidationError::InvalidTaxId {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if digits.len() != 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected exactly 9 digits"));
        }
        if digits.starts_with('0') {
            return Err(invalid("leading digit may not be 0"));
        }

        let bytes = digits.as_bytes();
        let weighted: u32 = bytes[..8]
            .iter()
            .zip((2..=9).rev())
            .map(|(b, w)| u32::from(b - b'0') * w)
            .sum();
        let check = match 11 - (weighted % 11) {
            10 | 11 => 0,
            n => n,
        };
        if u32::from(bytes[8] - b'0') != check {
            return Err(invalid("check digit mismatch"));
        }

        Ok(Self(digits.to_string()))
    }

    /// The final-consumer tax identifier.
    pub fn final_consumer() -> Self {
        Self(Self::FINAL_CONSUMER.to_string())
    }

    /// Whether this is the final-consumer placeholder.
    pub fn is_final_consumer(&self) -> bool {
        self.0 == Self::FINAL_CONSUMER
    }

    /// Access the normalized 9-digit value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
