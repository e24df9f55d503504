//! # Export Subcommands
//!
//! `fisc export saft` writes the audit file of a period; `fisc export
//! document` writes a single document in the same schema. Each file gets a
//! `<name>.sha256` companion in `sha256sum` format.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use fisc_core::{DocumentId, OrganizationId, Timestamp};
use fisc_saft::{ExportRequest, ExportedFile};

use crate::context::Context;

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub command: ExportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    /// Export every document issued in a period.
    Saft(SaftArgs),

    /// Export one document.
    Document(DocumentExportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SaftArgs {
    #[arg(long)]
    pub org: String,

    /// First issue date included.
    #[arg(long)]
    pub start: NaiveDate,

    /// Last issue date included.
    #[arg(long)]
    pub end: NaiveDate,

    /// Creation date written in the header. Defaults to today (UTC).
    #[arg(long)]
    pub generated_on: Option<NaiveDate>,

    /// Also export proformas as working documents.
    #[arg(long)]
    pub working_documents: bool,

    /// Output directory.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DocumentExportArgs {
    pub id: String,

    #[arg(long)]
    pub generated_on: Option<NaiveDate>,

    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

pub async fn run_export(args: &ExportArgs, ctx: &Context) -> Result<u8> {
    let path = match &args.command {
        ExportCommand::Saft(saft) => export_period(saft, ctx).await?,
        ExportCommand::Document(doc) => export_document(doc, ctx).await?,
    };
    println!("{}", path.display());
    Ok(0)
}

pub async fn export_period(args: &SaftArgs, ctx: &Context) -> Result<PathBuf> {
    let request = ExportRequest {
        organization_id: OrganizationId::parse(&args.org).context("invalid --org")?,
        start: args.start,
        end: args.end,
        generated_on: args.generated_on.unwrap_or_else(today),
        include_working_documents: args.working_documents,
    };
    let file = ctx.exporter().await?.export(&request).await?;
    write_with_digest(&args.out, &file)
}

pub async fn export_document(args: &DocumentExportArgs, ctx: &Context) -> Result<PathBuf> {
    let id = DocumentId::parse(&args.id).context("invalid document id")?;
    let file = ctx
        .exporter()
        .await?
        .export_document(&id, args.generated_on.unwrap_or_else(today))
        .await?;
    write_with_digest(&args.out, &file)
}

fn today() -> NaiveDate {
    Timestamp::now().date()
}

/// Write the file and its `.sha256` companion; returns the file's path.
pub fn write_with_digest(dir: &Path, file: &ExportedFile) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(&file.file_name);
    std::fs::write(&path, &file.contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    let digest_path = dir.join(format!("{}.sha256", file.file_name));
    std::fs::write(&digest_path, format!("{}  {}\n", file.sha256, file.file_name))
        .with_context(|| format!("failed to write {}", digest_path.display()))?;
    tracing::info!(file = %path.display(), sha256 = %file.sha256, "export written");
    Ok(path)
}
