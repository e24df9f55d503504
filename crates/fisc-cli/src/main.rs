//! # fisc CLI entry point
//!
//! Parses command-line arguments, initializes tracing and dispatches to the
//! subcommand handlers in `fisc_cli`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fisc_cli::context::Context;
use fisc_cli::document::{
    run_cancel, run_convert, run_credit_note, run_debit_note, run_issue, run_show, CancelArgs,
    ConvertArgs, InputArgs, ShowArgs,
};
use fisc_cli::export::{run_export, ExportArgs};
use fisc_cli::keys::{run_keys, KeysArgs};
use fisc_cli::master::{run_org, run_product, OrgArgs, ProductArgs};
use fisc_cli::verify::{run_verify, VerifyArgs};

/// Fiscal document engine.
///
/// Issues sequentially numbered, RSA-SHA1 signed and hash-chained fiscal
/// documents, manages their lifecycle and exports SAF-T style audit files.
#[derive(Parser, Debug)]
#[command(name = "fisc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL. Falls back to FISC_DATABASE_URL.
    #[arg(long, global = true)]
    database: Option<String>,

    /// Signing key directory. Falls back to FISC_KEY_DIR.
    #[arg(long, global = true)]
    keys: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and apply migrations.
    Init,

    /// Issuing organizations.
    Org(OrgArgs),

    /// Products and stock.
    Product(ProductArgs),

    /// Signing keys.
    Keys(KeysArgs),

    /// Issue a document from a JSON input file.
    Issue(InputArgs),

    /// Cancel an issued document.
    Cancel(CancelArgs),

    /// Issue a credit note from a JSON input file.
    CreditNote(InputArgs),

    /// Issue a debit note from a JSON input file.
    DebitNote(InputArgs),

    /// Convert a proforma into an invoice-receipt.
    Convert(ConvertArgs),

    /// Print a document as JSON.
    Show(ShowArgs),

    /// Verify signature chains.
    Verify(VerifyArgs),

    /// Write audit files.
    Export(ExportArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match Context::resolve(cli.config.as_deref(), cli.database, cli.keys) {
        Ok(ctx) => dispatch(cli.command, &ctx).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(command: Commands, ctx: &Context) -> anyhow::Result<u8> {
    match command {
        Commands::Init => {
            let store = ctx.store().await?;
            store.close().await;
            println!("database ready: {}", ctx.database_url);
            Ok(0)
        }
        Commands::Org(args) => run_org(&args, ctx).await,
        Commands::Product(args) => run_product(&args, ctx).await,
        Commands::Keys(args) => run_keys(&args, ctx),
        Commands::Issue(args) => run_issue(&args, ctx).await,
        Commands::Cancel(args) => run_cancel(&args, ctx).await,
        Commands::CreditNote(args) => run_credit_note(&args, ctx).await,
        Commands::DebitNote(args) => run_debit_note(&args, ctx).await,
        Commands::Convert(args) => run_convert(&args, ctx).await,
        Commands::Show(args) => run_show(&args, ctx).await,
        Commands::Verify(args) => run_verify(&args, ctx).await,
        Commands::Export(args) => run_export(&args, ctx).await,
    }
}
