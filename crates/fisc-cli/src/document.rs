//! # Document Subcommands
//!
//! Issuance, derivation, cancellation and lookup. Inputs for `issue`,
//! `credit-note` and `debit-note` are JSON files in the shape of the
//! `fisc-lifecycle` input types. Every command prints the resulting document
//! as JSON.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::Args;
use fisc_core::{DocumentId, DocumentNumber, FiscalDocument, OrganizationId, PaymentMethod};
use fisc_lifecycle::{ConversionInput, CreateDocumentInput, CreditNoteInput, DebitNoteInput};

use crate::context::Context;
use crate::{print_json, read_json};

/// A JSON input file (`-` for stdin).
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CancelArgs {
    /// Document id.
    pub id: String,

    #[arg(long)]
    pub reason: String,

    #[arg(long)]
    pub actor: String,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Proforma id.
    pub id: String,

    #[arg(long)]
    pub actor: String,

    /// Issue date of the invoice-receipt. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Payment mechanism code (NU, CC, TB, CH, OU). Defaults to the
    /// proforma's.
    #[arg(long)]
    pub payment_method: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Document id, or document number together with `--org`.
    pub document: String,

    #[arg(long)]
    pub org: Option<String>,
}

pub async fn run_issue(args: &InputArgs, ctx: &Context) -> Result<u8> {
    let input: CreateDocumentInput = read_json(&args.input)?;
    let doc = ctx.service().await?.create(&input).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn run_credit_note(args: &InputArgs, ctx: &Context) -> Result<u8> {
    let input: CreditNoteInput = read_json(&args.input)?;
    let doc = ctx.service().await?.derive_credit_note(&input).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn run_debit_note(args: &InputArgs, ctx: &Context) -> Result<u8> {
    let input: DebitNoteInput = read_json(&args.input)?;
    let doc = ctx.service().await?.derive_debit_note(&input).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn run_cancel(args: &CancelArgs, ctx: &Context) -> Result<u8> {
    let doc = cancel(args, ctx).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn run_convert(args: &ConvertArgs, ctx: &Context) -> Result<u8> {
    let doc = convert(args, ctx).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn run_show(args: &ShowArgs, ctx: &Context) -> Result<u8> {
    let doc = show(args, ctx).await?;
    print_json(&doc)?;
    Ok(0)
}

pub async fn cancel(args: &CancelArgs, ctx: &Context) -> Result<FiscalDocument> {
    let id = DocumentId::parse(&args.id).context("invalid document id")?;
    let doc = ctx
        .service()
        .await?
        .cancel(&id, &args.reason, &args.actor)
        .await?;
    Ok(doc)
}

pub async fn convert(args: &ConvertArgs, ctx: &Context) -> Result<FiscalDocument> {
    let proforma_id = DocumentId::parse(&args.id).context("invalid proforma id")?;
    let payment_method = args
        .payment_method
        .as_deref()
        .map(PaymentMethod::from_code)
        .transpose()?;
    let input = ConversionInput {
        proforma_id,
        issue_date: args.date,
        payment_method,
        actor: args.actor.clone(),
    };
    Ok(ctx.service().await?.convert_proforma_to_invoice(&input).await?)
}

pub async fn show(args: &ShowArgs, ctx: &Context) -> Result<FiscalDocument> {
    let service = ctx.service().await?;
    if let Ok(id) = DocumentId::parse(&args.document) {
        return Ok(service.get(&id).await?);
    }
    let number = DocumentNumber::parse(&args.document)
        .with_context(|| format!("{:?} is neither a document id nor a number", args.document))?;
    let org = args
        .org
        .as_deref()
        .context("--org is required when looking up by number")?;
    let org = OrganizationId::parse(org).context("invalid --org")?;
    Ok(service.get_by_number(&org, &number).await?)
}
