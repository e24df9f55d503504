//! Shared command context: configuration, database location and key
//! directory, resolved once from global flags and the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use fisc_core::FiscalConfig;
use fisc_crypto::key_provider::KEY_DIR_ENV;
use fisc_crypto::DirectoryKeyProvider;
use fisc_lifecycle::DocumentService;
use fisc_saft::Exporter;
use fisc_store::{Store, DATABASE_URL_ENV};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://fiscal.db";
pub const DEFAULT_KEY_DIR: &str = "keys";

#[derive(Debug, Clone)]
pub struct Context {
    pub config: FiscalConfig,
    pub database_url: String,
    pub key_dir: PathBuf,
}

impl Context {
    /// Resolve the context. Flags win over `FISC_DATABASE_URL` and
    /// `FISC_KEY_DIR`, which win over the defaults.
    pub fn resolve(
        config: Option<&Path>,
        database: Option<String>,
        keys: Option<PathBuf>,
    ) -> Result<Self> {
        let config = match config {
            Some(path) => load_config(path)?,
            None => FiscalConfig::default(),
        };
        let database_url = database
            .or_else(|| std::env::var(DATABASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let key_dir = keys
            .or_else(|| std::env::var_os(KEY_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_DIR));
        tracing::debug!(database = %database_url, keys = %key_dir.display(), "context resolved");
        Ok(Self {
            config,
            database_url,
            key_dir,
        })
    }

    pub async fn store(&self) -> Result<Store> {
        Store::connect(&self.database_url)
            .await
            .with_context(|| format!("failed to open database {}", self.database_url))
    }

    pub fn keys(&self) -> DirectoryKeyProvider {
        DirectoryKeyProvider::new(&self.key_dir)
    }

    pub async fn service(&self) -> Result<DocumentService<DirectoryKeyProvider>> {
        Ok(DocumentService::new(
            self.store().await?,
            self.keys(),
            self.config.clone(),
        ))
    }

    pub async fn exporter(&self) -> Result<Exporter> {
        Ok(Exporter::new(self.store().await?, self.config.clone()))
    }
}

/// Load and validate a YAML configuration file. Missing fields take their
/// defaults.
pub fn load_config(path: &Path) -> Result<FiscalConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FiscalConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fisc.yaml");
        std::fs::write(
            &path,
            "simplified_invoice_ceiling: \"500.00\"\nsoftware:\n  certificate_number: \"1234/AT\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.simplified_invoice_ceiling, Decimal::new(50_000, 2));
        assert_eq!(config.software.certificate_number, "1234/AT");
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.sequence_retry_limit, 5);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fisc.yaml");
        std::fs::write(&path, "sequence_retry_limit: 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("sequence_retry_limit"));
    }

    #[test]
    fn flags_override_defaults() {
        let ctx = Context::resolve(
            None,
            Some("sqlite://elsewhere.db".into()),
            Some(PathBuf::from("/etc/fisc/keys")),
        )
        .unwrap();
        assert_eq!(ctx.database_url, "sqlite://elsewhere.db");
        assert_eq!(ctx.key_dir, PathBuf::from("/etc/fisc/keys"));
        assert_eq!(ctx.config, FiscalConfig::default());
    }
}
