//! Engine configuration, loaded from YAML by the CLI. Every field has a
//! default so an empty file is a valid configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FiscalError;

/// Tunables that affect issuance and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalConfig {
    /// Maximum grand total of a simplified invoice.
    pub simplified_invoice_ceiling: Decimal,
    /// ISO 4217 currency code written to the audit file.
    pub currency: String,
    /// Tax country/region code written on audit-file tax blocks.
    pub tax_country_region: String,
    /// Attempts made when sequence allocation collides.
    pub sequence_retry_limit: u32,
    pub software: SoftwareIdentity,
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            simplified_invoice_ceiling: Decimal::new(100_000, 2),
            currency: "EUR".to_string(),
            tax_country_region: "PT".to_string(),
            sequence_retry_limit: 5,
            software: SoftwareIdentity::default(),
        }
    }
}

impl FiscalConfig {
    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<(), FiscalError> {
        if self.simplified_invoice_ceiling <= Decimal::ZERO {
            return Err(FiscalError::Configuration(
                "simplified_invoice_ceiling must be positive".into(),
            ));
        }
        if self.sequence_retry_limit == 0 {
            return Err(FiscalError::Configuration(
                "sequence_retry_limit must be at least 1".into(),
            ));
        }
        if self.currency.len() != 3 {
            return Err(FiscalError::Configuration(format!(
                "currency must be a 3-letter code, got {:?}",
                self.currency
            )));
        }
        Ok(())
    }
}

/// Certified-software identification printed in the audit file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareIdentity {
    pub certificate_number: String,
    pub product_id: String,
    pub product_version: String,
    pub producer_tax_id: String,
}

impl Default for SoftwareIdentity {
    fn default() -> Self {
        Self {
            certificate_number: "0".to_string(),
            product_id: "fisc/fisc".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            producer_tax_id: "999999990".to_string(),
        }
    }
}
