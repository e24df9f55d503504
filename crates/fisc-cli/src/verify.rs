//! `fisc verify`: re-derive signing inputs from stored documents and check
//! every link. Exits with status 2 when a chain is broken.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use fisc_core::{DocumentId, FiscalError, OrganizationId, Series};
use fisc_crypto::ChainReport;

use crate::context::Context;

/// Exit status for a broken chain.
pub const EXIT_BROKEN_CHAIN: u8 = 2;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(subcommand)]
    pub command: VerifyCommand,
}

#[derive(Subcommand, Debug)]
pub enum VerifyCommand {
    /// Verify one document against its predecessor.
    Document { id: String },

    /// Verify a whole series, e.g. `FT/2025`.
    Series {
        #[arg(long)]
        org: String,
        series: String,
    },

    /// Verify every signed series of an organization.
    Org { org: String },
}

pub async fn run_verify(args: &VerifyArgs, ctx: &Context) -> Result<u8> {
    let service = ctx.service().await?;
    let outcome = match &args.command {
        VerifyCommand::Document { id } => {
            let id = DocumentId::parse(id).context("invalid document id")?;
            service.verify_document(&id).await.map(|()| {
                println!("OK {id}");
            })
        }
        VerifyCommand::Series { org, series } => {
            let org = OrganizationId::parse(org).context("invalid --org")?;
            let series = Series::parse(series).context("invalid series")?;
            service
                .verify_series(&org, &series)
                .await
                .map(|report| print_report(&report))
        }
        VerifyCommand::Org { org } => {
            let org = OrganizationId::parse(org).context("invalid organization id")?;
            service
                .verify_organization(&org)
                .await
                .map(|reports| reports.iter().for_each(print_report))
        }
    };

    match outcome {
        Ok(()) => Ok(0),
        Err(FiscalError::ChainIntegrity { document, reason }) => {
            println!("BROKEN {document}: {reason}");
            tracing::warn!(document = %document, reason = %reason, "chain verification failed");
            Ok(EXIT_BROKEN_CHAIN)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &ChainReport) {
    println!("OK {}: {} documents", report.series, report.verified);
}
