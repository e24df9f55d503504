//! # Master Data Subcommands
//!
//! `fisc org add` registers an issuing organization; `fisc product add`
//! registers a product with its opening stock level.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use fisc_core::{Address, Organization, OrganizationId, ProductId, TaxId};
use fisc_store::Product;
use rust_decimal::Decimal;

use crate::context::Context;

#[derive(Args, Debug)]
pub struct OrgArgs {
    #[command(subcommand)]
    pub command: OrgCommand,
}

#[derive(Subcommand, Debug)]
pub enum OrgCommand {
    /// Register an issuing organization.
    Add(OrgAddArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OrgAddArgs {
    /// Tax registration number (9 digits, check digit verified).
    #[arg(long)]
    pub tax_id: String,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "")]
    pub street: String,

    #[arg(long, default_value = "")]
    pub city: String,

    #[arg(long, default_value = "")]
    pub postal_code: String,

    #[arg(long, default_value = "PT")]
    pub country: String,

    #[arg(long, default_value = "normal")]
    pub regime: String,
}

#[derive(Args, Debug)]
pub struct ProductArgs {
    #[command(subcommand)]
    pub command: ProductCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProductCommand {
    /// Register a product and its opening stock level.
    Add(ProductAddArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProductAddArgs {
    /// Owning organization id.
    #[arg(long)]
    pub org: String,

    #[arg(long)]
    pub code: String,

    #[arg(long)]
    pub name: String,

    /// Opening stock quantity.
    #[arg(long, default_value = "0")]
    pub stock: Decimal,
}

pub async fn run_org(args: &OrgArgs, ctx: &Context) -> Result<u8> {
    match &args.command {
        OrgCommand::Add(add) => {
            let org = add_organization(add, ctx).await?;
            println!("{}", org.id);
            Ok(0)
        }
    }
}

pub async fn run_product(args: &ProductArgs, ctx: &Context) -> Result<u8> {
    match &args.command {
        ProductCommand::Add(add) => {
            let product = add_product(add, ctx).await?;
            println!("{}", product.id);
            Ok(0)
        }
    }
}

pub async fn add_organization(args: &OrgAddArgs, ctx: &Context) -> Result<Organization> {
    let org = Organization {
        id: OrganizationId::new(),
        tax_id: TaxId::parse(&args.tax_id)?,
        name: args.name.clone(),
        address: Address {
            street: args.street.clone(),
            city: args.city.clone(),
            postal_code: args.postal_code.clone(),
            country: args.country.clone(),
        },
        fiscal_regime: args.regime.clone(),
    };
    let service = ctx.service().await?;
    service.register_organization(&org).await?;
    Ok(org)
}

pub async fn add_product(args: &ProductAddArgs, ctx: &Context) -> Result<Product> {
    let organization_id = OrganizationId::parse(&args.org).context("invalid --org")?;
    let service = ctx.service().await?;
    // Fails with NotFound for an unknown organization.
    service.organization(&organization_id).await?;
    let product = Product {
        id: ProductId::new(),
        organization_id,
        code: args.code.clone(),
        name: args.name.clone(),
        stock_quantity: args.stock,
    };
    service.register_product(&product).await?;
    Ok(product)
}
