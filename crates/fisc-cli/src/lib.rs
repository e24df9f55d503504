//! # fisc-cli: Command-Line Interface for the Fiscal Engine
//!
//! Provides the `fisc` binary. Argument parsing lives in the subcommand
//! modules; the work is delegated to `fisc-lifecycle` and `fisc-saft`.
//!
//! ## Subcommands
//!
//! - `fisc init`: create the database and apply migrations.
//! - `fisc org add` / `fisc product add`: master data.
//! - `fisc keys generate`: write the next signing key version.
//! - `fisc issue`, `fisc credit-note`, `fisc debit-note`: issue from a JSON
//!   input file (`-` reads stdin).
//! - `fisc cancel`, `fisc convert`, `fisc show`.
//! - `fisc verify document|series|org`: re-check signature chains.
//! - `fisc export saft|document`: write audit files with `.sha256`
//!   digests next to them.
//!
//! ```bash
//! fisc --database sqlite://fiscal.db --keys ./keys init
//! fisc org add --tax-id 500000000 --name "Loja Exemplo"
//! fisc issue invoice.json
//! fisc export saft --org <id> --start 2025-01-01 --end 2025-12-31 --out ./saft
//! ```

pub mod context;
pub mod document;
pub mod export;
pub mod keys;
pub mod master;
pub mod verify;

use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a JSON document from `path`, or from stdin when `path` is `-`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisc_lifecycle::CreateDocumentInput;

    #[test]
    fn read_json_parses_issue_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");
        std::fs::write(
            &path,
            r#"{
                "organization_id": "7b0c2a51-3f5e-4a8e-9d43-2f1b7c9e8a10",
                "document_type": "INVOICE",
                "lines": [
                    {"code": "SKU-1", "name": "Caneca", "quantity": "2",
                     "unit_price": "10.00", "tax_rate": "23"}
                ],
                "actor": "clerk"
            }"#,
        )
        .unwrap();
        let input: CreateDocumentInput = read_json(&path).unwrap();
        assert_eq!(input.lines.len(), 1);
        assert_eq!(input.actor, "clerk");
    }

    #[test]
    fn read_json_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let err = read_json::<CreateDocumentInput>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn read_json_missing_file() {
        let err = read_json::<CreateDocumentInput>(Path::new("/nonexistent/x.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
