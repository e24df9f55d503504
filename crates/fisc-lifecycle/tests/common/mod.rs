//! Shared fixtures for lifecycle integration tests.

#![allow(dead_code)]

use std::str::FromStr;

use chrono::NaiveDate;
use fisc_core::{
    Address, Counterparty, DocumentType, FiscalConfig, Organization, OrganizationId,
    ProductId, TaxId,
};
use fisc_crypto::{LocalKeyProvider, SigningKey};
use fisc_lifecycle::{CreateDocumentInput, DocumentService, LineInput};
use fisc_store::{Product, Store};
use rust_decimal::Decimal;

pub const ORG_V1: &str = include_str!("../fixtures/org_v1.pem");
pub const ORG_V2: &str = include_str!("../fixtures/org_v2.pem");
pub const VENDOR_PKCS1: &str = include_str!("../fixtures/vendor_pkcs1.pem");

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn date(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn organization() -> Organization {
    Organization {
        id: OrganizationId::new(),
        tax_id: TaxId::parse("500000000").unwrap(),
        name: "Loja Exemplo, Lda".into(),
        address: Address {
            street: "Rua Direita 1".into(),
            city: "Lisboa".into(),
            postal_code: "1100-001".into(),
            country: "PT".into(),
        },
        fiscal_regime: "normal".into(),
    }
}

pub fn customer() -> Counterparty {
    Counterparty {
        customer_id: Some("C-0001".into()),
        name: "Ana Silva".into(),
        tax_id: Some(TaxId::parse("123456789").unwrap()),
        address: Some(Address {
            street: "Av. Central 5".into(),
            city: "Porto".into(),
            postal_code: "4000-001".into(),
            country: "PT".into(),
        }),
        phone: None,
        email: None,
    }
}

pub fn line(quantity: &str, unit_price: &str) -> LineInput {
    LineInput {
        product_id: None,
        code: "SKU-1".into(),
        name: "Caneca".into(),
        quantity: d(quantity),
        unit_price: d(unit_price),
        tax_rate: d("23"),
        exemption: None,
        discount: Decimal::ZERO,
    }
}

pub fn product_line(product: ProductId, quantity: &str, unit_price: &str) -> LineInput {
    LineInput {
        product_id: Some(product),
        ..line(quantity, unit_price)
    }
}

pub fn invoice(org: &Organization, issue_date: NaiveDate, lines: Vec<LineInput>) -> CreateDocumentInput {
    CreateDocumentInput {
        organization_id: org.id,
        document_type: DocumentType::Invoice,
        issue_date: Some(issue_date),
        due_date: None,
        counterparty: Some(customer()),
        lines,
        payment_method: None,
        notes: None,
        actor: "clerk".into(),
    }
}

pub fn of_type(
    org: &Organization,
    document_type: DocumentType,
    issue_date: NaiveDate,
    lines: Vec<LineInput>,
) -> CreateDocumentInput {
    CreateDocumentInput {
        document_type,
        ..invoice(org, issue_date, lines)
    }
}

pub fn keys_for(org: &Organization) -> LocalKeyProvider {
    LocalKeyProvider::new().with_key(org.id, SigningKey::from_pem(ORG_V1, 1).unwrap())
}

/// An in-memory service with one registered organization.
pub async fn service() -> (DocumentService<LocalKeyProvider>, Organization) {
    service_with(FiscalConfig::default()).await
}

pub async fn service_with(config: FiscalConfig) -> (DocumentService<LocalKeyProvider>, Organization) {
    let store = Store::in_memory().await.unwrap();
    let org = organization();
    let service = DocumentService::new(store, keys_for(&org), config);
    service.register_organization(&org).await.unwrap();
    (service, org)
}

pub async fn register_product<K: fisc_crypto::KeyProvider, S: fisc_store::StockLedger>(
    service: &DocumentService<K, S>,
    org: &Organization,
    opening: &str,
) -> ProductId {
    let product = Product {
        id: ProductId::new(),
        organization_id: org.id,
        code: "SKU-1".into(),
        name: "Caneca".into(),
        stock_quantity: d(opening),
    };
    service.register_product(&product).await.unwrap();
    product.id
}
