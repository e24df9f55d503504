//! Issuance, cancellation and chain verification through `DocumentService`.

mod common;

use common::*;
use fisc_core::{
    DocumentNumber, DocumentStatus, DocumentType, FiscalConfig, FiscalError, KeyOwner,
    PaymentStatus, Series, SigningInput, ValidationError,
};
use fisc_crypto::{verify_base64, DirectoryKeyProvider, KeyProvider, SigningKey};
use fisc_lifecycle::DocumentService;
use fisc_store::{documents, sequence, Store};

#[tokio::test]
async fn test_first_invoice_is_numbered_and_signed_over_empty_previous() {
    let (service, org) = service().await;
    let doc = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("2", "10")]))
        .await
        .unwrap();

    assert_eq!(doc.number.to_string(), "FT/2025/000001");
    assert_eq!(doc.status, DocumentStatus::Issued);
    assert_eq!(doc.totals.grand_total, d("24.60"));
    assert_eq!(doc.payment_status, PaymentStatus::Pending);
    assert_eq!(doc.signature_key_version, Some(1));
    assert_eq!(doc.signature_key_owner, Some(KeyOwner::Organization));
    assert_eq!(doc.created_by, "clerk");

    let input = SigningInput::for_document(&doc, "");
    assert!(input.as_str().starts_with("2025-03-01;"));
    assert!(input.as_str().ends_with(";FT/2025/000001;24.60;"));
    let key = service
        .keys()
        .verifying_key(&org.id, KeyOwner::Organization, 1)
        .unwrap();
    assert!(verify_base64(&key, &input, doc.signature.as_deref().unwrap()));

    let stored = service.get(&doc.id).await.unwrap();
    assert_eq!(stored, doc);
}

#[tokio::test]
async fn test_second_invoice_chains_onto_first() {
    let (service, org) = service().await;
    let first = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "100")]))
        .await
        .unwrap();
    let second = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("3", "5")]))
        .await
        .unwrap();

    assert_eq!(second.number.to_string(), "FT/2025/000002");
    let key = service
        .keys()
        .verifying_key(&org.id, KeyOwner::Organization, 1)
        .unwrap();
    let chained = SigningInput::for_document(&second, first.signature.as_deref().unwrap());
    assert!(verify_base64(&key, &chained, second.signature.as_deref().unwrap()));
    // The same signature does not verify as a chain head.
    let unchained = SigningInput::for_document(&second, "");
    assert!(!verify_base64(&key, &unchained, second.signature.as_deref().unwrap()));

    service.verify_document(&second.id).await.unwrap();
    let report = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap();
    assert_eq!(report.verified, 2);
    assert_eq!(report.head, second.signature);
}

#[tokio::test]
async fn test_series_are_independent_per_type_and_year() {
    let (service, org) = service().await;
    let ft = service
        .create(&invoice(&org, date(2024, 12, 31), vec![line("1", "1")]))
        .await
        .unwrap();
    let ft_next_year = service
        .create(&invoice(&org, date(2025, 1, 1), vec![line("1", "1")]))
        .await
        .unwrap();
    let fs = service
        .create(&of_type(&org, DocumentType::SimplifiedInvoice, date(2025, 1, 1), vec![line("1", "1")]))
        .await
        .unwrap();

    assert_eq!(ft.number.to_string(), "FT/2024/000001");
    assert_eq!(ft_next_year.number.to_string(), "FT/2025/000001");
    assert_eq!(fs.number.to_string(), "FS/2025/000001");
    assert_eq!(fs.payment_status, PaymentStatus::Paid);

    let reports = service.verify_organization(&org.id).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.verified == 1));
}

#[tokio::test]
async fn test_cancellation_preserves_chain() {
    let (service, org) = service().await;
    let first = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("2", "10")]))
        .await
        .unwrap();
    let second = service
        .create(&invoice(&org, date(2025, 3, 2), vec![line("1", "10")]))
        .await
        .unwrap();

    let cancelled = service.cancel(&first.id, "wrong customer", "manager").await.unwrap();
    assert_eq!(cancelled.status, DocumentStatus::Cancelled);
    let cancellation = cancelled.cancellation.clone().unwrap();
    assert_eq!(cancellation.reason, "wrong customer");
    assert_eq!(cancellation.cancelled_by, "manager");

    let stored = service.get(&first.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Cancelled);
    assert_eq!(stored.signature, first.signature);
    assert_eq!(stored.totals, first.totals);
    assert_eq!(stored.number, first.number);

    service.verify_document(&second.id).await.unwrap();
    let report = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap();
    assert_eq!(report.verified, 2);
}

#[tokio::test]
async fn test_cancelling_twice_is_rejected() {
    let (service, org) = service().await;
    let doc = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    service.cancel(&doc.id, "duplicate", "manager").await.unwrap();

    let err = service.cancel(&doc.id, "again", "manager").await.unwrap_err();
    assert!(matches!(err, FiscalError::InvalidTransition(_)), "{err}");
    let stored = service.get(&doc.id).await.unwrap();
    assert_eq!(stored.cancellation.unwrap().reason, "duplicate");
}

#[tokio::test]
async fn test_cancel_requires_reason_and_existing_document() {
    let (service, org) = service().await;
    let doc = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();

    let err = service.cancel(&doc.id, "  ", "manager").await.unwrap_err();
    assert!(matches!(
        err,
        FiscalError::Validation(ValidationError::InvalidField { field: "reason", .. })
    ));
    let err = service
        .cancel(&fisc_core::DocumentId::new(), "reason", "manager")
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::NotFound { kind: "document", .. }));
    assert_eq!(service.get(&doc.id).await.unwrap().status, DocumentStatus::Issued);
}

#[tokio::test]
async fn test_validation_failures_consume_no_number() {
    let (service, org) = service().await;
    let series = Series::new(DocumentType::Invoice, 2025);

    let mut no_tax_id = invoice(&org, date(2025, 3, 1), vec![line("1", "10")]);
    no_tax_id.counterparty.as_mut().unwrap().tax_id = None;
    let err = service.create(&no_tax_id).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::MissingCounterpartyTaxId)));

    let mut anonymous = invoice(&org, date(2025, 3, 1), vec![line("1", "10")]);
    anonymous.counterparty = None;
    assert!(service.create(&anonymous).await.is_err());

    let empty = invoice(&org, date(2025, 3, 1), vec![]);
    let err = service.create(&empty).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::NoLines)));

    let over = of_type(&org, DocumentType::SimplifiedInvoice, date(2025, 3, 1), vec![line("1", "813.02")]);
    let err = service.create(&over).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::CeilingExceeded { .. })));

    let mut other_org = invoice(&org, date(2025, 3, 1), vec![line("1", "10")]);
    other_org.organization_id = fisc_core::OrganizationId::new();
    let err = service.create(&other_org).await.unwrap_err();
    assert!(matches!(err, FiscalError::NotFound { kind: "organization", .. }));

    let mut conn = service.store().acquire().await.unwrap();
    assert_eq!(sequence::current(&mut conn, &org.id, &series).await.unwrap(), 0);
    drop(conn);

    let doc = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(doc.sequence(), 1);
}

#[tokio::test]
async fn test_simplified_invoice_at_ceiling_is_accepted() {
    let (service, org) = service().await;
    // 813.01 net + 186.99 tax
    let doc = service
        .create(&of_type(&org, DocumentType::SimplifiedInvoice, date(2025, 3, 1), vec![line("1", "813.01")]))
        .await
        .unwrap();
    assert_eq!(doc.totals.grand_total, d("1000.00"));
}

#[tokio::test]
async fn test_configured_ceiling_applies() {
    let config = FiscalConfig {
        simplified_invoice_ceiling: d("100"),
        ..FiscalConfig::default()
    };
    let (service, org) = service_with(config).await;
    let err = service
        .create(&of_type(&org, DocumentType::SimplifiedInvoice, date(2025, 3, 1), vec![line("1", "100")]))
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::CeilingExceeded { .. })));
}

#[tokio::test]
async fn test_backdated_issue_is_rejected_and_number_released() {
    let (service, org) = service().await;
    service
        .create(&invoice(&org, date(2025, 3, 5), vec![line("1", "10")]))
        .await
        .unwrap();

    let err = service
        .create(&invoice(&org, date(2025, 3, 4), vec![line("1", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::ChronologyViolation { .. })));

    let next = service
        .create(&invoice(&org, date(2025, 3, 5), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(next.number.to_string(), "FT/2025/000002");
}

#[tokio::test]
async fn test_future_issue_date_is_rejected() {
    let (service, org) = service().await;
    let tomorrow = fisc_core::Timestamp::now().date().succ_opt().unwrap();
    let err = service
        .create(&invoice(&org, tomorrow, vec![line("1", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::ChronologyViolation { .. })));
}

#[tokio::test]
async fn test_missing_key_aborts_issuance() {
    let store = Store::in_memory().await.unwrap();
    let org = organization();
    let service = DocumentService::new(store, fisc_crypto::LocalKeyProvider::new(), FiscalConfig::default());
    service.register_organization(&org).await.unwrap();

    let err = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Signing(_)), "{err}");

    let mut conn = service.store().acquire().await.unwrap();
    let series = Series::new(DocumentType::Invoice, 2025);
    assert_eq!(sequence::current(&mut conn, &org.id, &series).await.unwrap(), 0);
    assert!(documents::list_series(&mut conn, &org.id, &series).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tampered_amount_breaks_chain_at_that_document() {
    let (service, org) = service().await;
    let mut issued = Vec::new();
    for day in 1..=3 {
        issued.push(
            service
                .create(&invoice(&org, date(2025, 3, day), vec![line("1", "10")]))
                .await
                .unwrap(),
        );
    }

    sqlx::query("DROP TRIGGER documents_immutable")
        .execute(service.store().pool())
        .await
        .unwrap();
    sqlx::query("UPDATE documents SET grand_total = '1.00' WHERE id = ?1")
        .bind(issued[1].id.to_string())
        .execute(service.store().pool())
        .await
        .unwrap();

    let err = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap_err();
    match err {
        FiscalError::ChainIntegrity { document, reason } => {
            assert_eq!(document, "FT/2025/000002");
            assert_eq!(reason, "signature mismatch");
        }
        other => panic!("expected chain integrity error, got {other}"),
    }
    assert!(service.verify_document(&issued[0].id).await.is_ok());
    assert!(service.verify_document(&issued[1].id).await.is_err());
}

#[tokio::test]
async fn test_key_rotation_keeps_old_documents_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let org = organization();
    let org_dir = dir.path().join(org.id.to_string());
    std::fs::create_dir_all(&org_dir).unwrap();
    std::fs::write(org_dir.join("v1.pem"), ORG_V1).unwrap();

    let store = Store::in_memory().await.unwrap();
    let service = DocumentService::new(store, DirectoryKeyProvider::new(dir.path()), FiscalConfig::default());
    service.register_organization(&org).await.unwrap();

    let first = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    std::fs::write(org_dir.join("v2.pem"), ORG_V2).unwrap();
    let second = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();

    assert_eq!(first.signature_key_version, Some(1));
    assert_eq!(second.signature_key_version, Some(2));
    let v2 = SigningKey::from_pem(ORG_V2, 2).unwrap().verifying_key();
    let input = SigningInput::for_document(&second, first.signature.as_deref().unwrap());
    assert!(verify_base64(&v2, &input, second.signature.as_deref().unwrap()));

    let report = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap();
    assert_eq!(report.verified, 2);
}

#[tokio::test]
async fn test_vendor_signed_documents_survive_organization_key_registration() {
    let dir = tempfile::tempdir().unwrap();
    let org = organization();
    let vendor_dir = dir.path().join("vendor");
    std::fs::create_dir_all(&vendor_dir).unwrap();
    std::fs::write(vendor_dir.join("v1.pem"), VENDOR_PKCS1).unwrap();

    let store = Store::in_memory().await.unwrap();
    let service = DocumentService::new(store, DirectoryKeyProvider::new(dir.path()), FiscalConfig::default());
    service.register_organization(&org).await.unwrap();

    let first = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(first.signature_key_owner, Some(KeyOwner::Vendor));
    assert_eq!(first.signature_key_version, Some(1));

    // The organization's own v1 shares the version number with the vendor key.
    let org_dir = dir.path().join(org.id.to_string());
    std::fs::create_dir_all(&org_dir).unwrap();
    std::fs::write(org_dir.join("v1.pem"), ORG_V1).unwrap();

    let second = service
        .create(&invoice(&org, date(2025, 3, 2), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(second.signature_key_owner, Some(KeyOwner::Organization));
    assert_eq!(second.signature_key_version, Some(1));

    service.verify_document(&first.id).await.unwrap();
    let report = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap();
    assert_eq!(report.verified, 2);
}

#[tokio::test]
async fn test_lookup_by_number() {
    let (service, org) = service().await;
    let doc = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    let number = DocumentNumber::parse("FT/2025/000001").unwrap();
    assert_eq!(service.get_by_number(&org.id, &number).await.unwrap().id, doc.id);

    let missing = DocumentNumber::parse("FT/2025/000002").unwrap();
    assert!(matches!(
        service.get_by_number(&org.id, &missing).await,
        Err(FiscalError::NotFound { .. })
    ));
}
