//! `fisc keys generate`: write the next RSA signing key version for an
//! organization, or for the vendor fallback set.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use fisc_core::OrganizationId;

use crate::context::Context;

#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Generate a new key version. Existing versions are kept so older
    /// documents stay verifiable.
    Generate {
        /// Organization id. Omit to generate a vendor key.
        #[arg(long)]
        org: Option<String>,

        /// RSA modulus size.
        #[arg(long, default_value_t = 2048)]
        bits: usize,
    },
}

pub fn run_keys(args: &KeysArgs, ctx: &Context) -> Result<u8> {
    match &args.command {
        KeysCommand::Generate { org, bits } => {
            let version = generate(ctx, org.as_deref(), *bits)?;
            println!("v{version}");
            Ok(0)
        }
    }
}

/// Generate and store a key; returns its version.
pub fn generate(ctx: &Context, org: Option<&str>, bits: usize) -> Result<u32> {
    let org = org
        .map(OrganizationId::parse)
        .transpose()
        .context("invalid --org")?;
    let key = ctx.keys().generate(org.as_ref(), bits)?;
    Ok(key.version())
}
