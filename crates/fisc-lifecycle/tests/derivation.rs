//! Credit notes, debit notes, proforma conversion and stock effects.

mod common;

use common::*;
use fisc_core::{
    DocumentStatus, DocumentType, FiscalConfig, FiscalError, PaymentMethod, PaymentStatus,
    Series, ValidationError,
};
use fisc_lifecycle::{ConversionInput, CreditNoteInput, CreditSelection, DebitNoteInput, DocumentService};
use fisc_store::{sequence, stock, SqliteConnection, StockLedger, StockMovement, Store, StoreError};

fn credit(source: &fisc_core::FiscalDocument, quantity: Option<&str>) -> CreditNoteInput {
    CreditNoteInput {
        source_id: source.id,
        lines: vec![CreditSelection {
            source_line_id: source.lines[0].id,
            quantity: quantity.map(d),
        }],
        reason: "returned goods".into(),
        issue_date: Some(date(2025, 3, 10)),
        actor: "clerk".into(),
    }
}

#[tokio::test]
async fn test_credit_note_references_source_and_is_paid() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("4", "10")]))
        .await
        .unwrap();

    let note = service.derive_credit_note(&credit(&source, Some("1"))).await.unwrap();
    assert_eq!(note.number.to_string(), "NC/2025/000001");
    assert_eq!(note.document_type, DocumentType::CreditNote);
    assert_eq!(note.payment_status, PaymentStatus::Paid);
    assert_eq!(note.counterparty, source.counterparty);
    let reference = note.source.clone().unwrap();
    assert_eq!(reference.document_id, source.id);
    assert_eq!(reference.document_number, source.number);
    assert_eq!(reference.reason.as_deref(), Some("returned goods"));
    assert_eq!(note.lines[0].source_line_id, Some(source.lines[0].id));
    assert_eq!(note.lines[0].unit_price, source.lines[0].unit_price);
    assert_eq!(note.totals.grand_total, d("12.30"));

    service.verify_document(&note.id).await.unwrap();
}

#[tokio::test]
async fn test_credit_notes_are_bounded_by_remaining_quantity() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("3", "10")]))
        .await
        .unwrap();

    service.derive_credit_note(&credit(&source, Some("2"))).await.unwrap();
    let err = service
        .derive_credit_note(&credit(&source, Some("2")))
        .await
        .unwrap_err();
    match err {
        FiscalError::Validation(ValidationError::OverCredit { line, requested, remaining }) => {
            assert_eq!(line, 1);
            assert_eq!(requested, d("2"));
            assert_eq!(remaining, d("1"));
        }
        other => panic!("expected over-credit, got {other}"),
    }

    // The rejected attempt released its number.
    let rest = service.derive_credit_note(&credit(&source, None)).await.unwrap();
    assert_eq!(rest.number.to_string(), "NC/2025/000002");
    assert_eq!(rest.lines[0].quantity, d("1"));

    let err = service.derive_credit_note(&credit(&source, None)).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::OverCredit { .. })));
}

#[tokio::test]
async fn test_sub_cent_partial_credits_never_exceed_source_value() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("3", "0.01")]))
        .await
        .unwrap();
    assert_eq!(source.totals.grand_total, d("0.04"));

    let mut credited = rust_decimal::Decimal::ZERO;
    for quantity in [Some("0.5"), Some("0.5"), Some("0.5"), Some("0.5"), Some("0.5"), None] {
        let note = service.derive_credit_note(&credit(&source, quantity)).await.unwrap();
        assert!(note.lines[0].line_total >= rust_decimal::Decimal::ZERO);
        credited += note.totals.grand_total;
        assert!(credited <= source.totals.grand_total);
    }
    assert_eq!(credited, source.totals.grand_total);

    let err = service.derive_credit_note(&credit(&source, None)).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::OverCredit { .. })));
}

#[tokio::test]
async fn test_cancelled_credit_note_frees_its_quantity() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("2", "10")]))
        .await
        .unwrap();
    let full = service.derive_credit_note(&credit(&source, None)).await.unwrap();
    service.cancel(&full.id, "issued by mistake", "manager").await.unwrap();

    let again = service.derive_credit_note(&credit(&source, None)).await.unwrap();
    assert_eq!(again.lines[0].quantity, d("2"));
    assert_eq!(again.totals.grand_total, source.totals.grand_total);
}

#[tokio::test]
async fn test_source_with_active_notes_cannot_be_cancelled() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("2", "10")]))
        .await
        .unwrap();
    let note = service.derive_credit_note(&credit(&source, Some("1"))).await.unwrap();

    let err = service.cancel(&source.id, "customer dispute", "manager").await.unwrap_err();
    assert!(matches!(err, FiscalError::InvalidTransition(ref m) if m.contains("NC/2025/000001")));

    service.cancel(&note.id, "customer dispute", "manager").await.unwrap();
    service.cancel(&source.id, "customer dispute", "manager").await.unwrap();
}

#[tokio::test]
async fn test_notes_require_an_issued_sale_source() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("2", "10")]))
        .await
        .unwrap();
    service.cancel(&source.id, "wrong price", "manager").await.unwrap();

    let err = service.derive_credit_note(&credit(&source, Some("1"))).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::InvalidSource { .. })));

    let proforma = service
        .create(&of_type(&org, DocumentType::Proforma, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    let err = service.derive_credit_note(&credit(&proforma, None)).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::InvalidSource { .. })));

    let mut missing = credit(&proforma, None);
    missing.source_id = fisc_core::DocumentId::new();
    let err = service.derive_credit_note(&missing).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::InvalidSource { .. })));

    let mut conn = service.store().acquire().await.unwrap();
    let nc = Series::new(DocumentType::CreditNote, 2025);
    assert_eq!(sequence::current(&mut conn, &org.id, &nc).await.unwrap(), 0);
}

#[tokio::test]
async fn test_debit_note_charges_extra_lines() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    let product = register_product(&service, &org, "5").await;

    let note = service
        .derive_debit_note(&DebitNoteInput {
            source_id: source.id,
            lines: vec![product_line(product, "1", "4.50")],
            reason: "delivery fee".into(),
            issue_date: Some(date(2025, 3, 2)),
            actor: "clerk".into(),
        })
        .await
        .unwrap();

    assert_eq!(note.number.to_string(), "ND/2025/000001");
    assert_eq!(note.source.as_ref().unwrap().document_id, source.id);
    assert!(note.lines[0].product_id.is_none());
    assert_eq!(note.totals.grand_total, d("5.54"));
    assert_eq!(service.stock_level(&product).await.unwrap(), d("5"));
    service.verify_document(&note.id).await.unwrap();
}

#[tokio::test]
async fn test_proforma_is_unsigned_and_not_cancellable() {
    let (service, org) = service().await;
    let proforma = service
        .create(&of_type(&org, DocumentType::Proforma, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();

    assert_eq!(proforma.number.to_string(), "PF/2025/000001");
    assert!(proforma.signature.is_none());
    assert!(proforma.signature_key_version.is_none());

    let err = service.cancel(&proforma.id, "no longer needed", "manager").await.unwrap_err();
    assert!(matches!(err, FiscalError::InvalidTransition(_)));
    let err = service.verify_document(&proforma.id).await.unwrap_err();
    assert!(matches!(err, FiscalError::Validation(_)));

    // An unsigned proforma does not break the invoice chain.
    let first = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(first.sequence(), 1);
    service.verify_document(&first.id).await.unwrap();
}

#[tokio::test]
async fn test_proforma_converts_once() {
    let (service, org) = service().await;
    let mut input = of_type(&org, DocumentType::Proforma, date(2025, 3, 1), vec![line("2", "10")]);
    input.notes = Some("valid for 30 days".into());
    let proforma = service.create(&input).await.unwrap();

    let conversion = ConversionInput {
        proforma_id: proforma.id,
        issue_date: Some(date(2025, 3, 3)),
        payment_method: Some(PaymentMethod::Card),
        actor: "clerk".into(),
    };
    let invoice = service.convert_proforma_to_invoice(&conversion).await.unwrap();
    assert_eq!(invoice.number.to_string(), "FR/2025/000001");
    assert_eq!(invoice.document_type, DocumentType::InvoiceReceipt);
    assert_eq!(invoice.counterparty, proforma.counterparty);
    assert_eq!(invoice.totals, proforma.totals);
    assert_eq!(invoice.lines.len(), 1);
    assert_ne!(invoice.lines[0].id, proforma.lines[0].id);
    assert_eq!(invoice.payment_method, Some(PaymentMethod::Card));
    assert_eq!(invoice.source.as_ref().unwrap().document_number, proforma.number);
    assert!(invoice.signature.is_some());

    let unchanged = service.get(&proforma.id).await.unwrap();
    assert_eq!(unchanged, proforma);

    let err = service.convert_proforma_to_invoice(&conversion).await.unwrap_err();
    assert!(matches!(err, FiscalError::InvalidTransition(ref m) if m.contains("FR/2025/000001")));

    // Cancelling the invoice-receipt allows a new conversion.
    service.cancel(&invoice.id, "wrong payment method", "manager").await.unwrap();
    let again = service.convert_proforma_to_invoice(&conversion).await.unwrap();
    assert_eq!(again.number.to_string(), "FR/2025/000002");
}

#[tokio::test]
async fn test_only_proformas_convert() {
    let (service, org) = service().await;
    let source = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    let err = service
        .convert_proforma_to_invoice(&ConversionInput {
            proforma_id: source.id,
            issue_date: Some(date(2025, 3, 1)),
            payment_method: None,
            actor: "clerk".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Validation(ValidationError::InvalidSource { .. })));
}

// ── stock ──

#[tokio::test]
async fn test_stock_follows_issue_credit_and_cancellation() {
    let (service, org) = service().await;
    let product = register_product(&service, &org, "10").await;

    let sale = service
        .create(&invoice(&org, date(2025, 3, 1), vec![product_line(product, "3", "10")]))
        .await
        .unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("7"));

    let note = service.derive_credit_note(&credit(&sale, Some("1"))).await.unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("8"));

    service.cancel(&note.id, "customer kept the item", "manager").await.unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("7"));

    service.cancel(&sale.id, "sale voided", "manager").await.unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("10"));

    let mut conn = service.store().acquire().await.unwrap();
    let movements = stock::movements_for_document(&mut conn, &sale.id).await.unwrap();
    let deltas: Vec<_> = movements.iter().map(|m| m.delta).collect();
    assert_eq!(deltas, vec![d("-3"), d("3")]);
}

#[tokio::test]
async fn test_proforma_moves_no_stock_until_converted() {
    let (service, org) = service().await;
    let product = register_product(&service, &org, "10").await;
    let proforma = service
        .create(&of_type(&org, DocumentType::Proforma, date(2025, 3, 1), vec![product_line(product, "2", "10")]))
        .await
        .unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("10"));

    service
        .convert_proforma_to_invoice(&ConversionInput {
            proforma_id: proforma.id,
            issue_date: Some(date(2025, 3, 2)),
            payment_method: None,
            actor: "clerk".into(),
        })
        .await
        .unwrap();
    assert_eq!(service.stock_level(&product).await.unwrap(), d("8"));
}

#[tokio::test]
async fn test_unregistered_product_rolls_back_issuance() {
    let (service, org) = service().await;
    let err = service
        .create(&invoice(
            &org,
            date(2025, 3, 1),
            vec![product_line(fisc_core::ProductId::new(), "1", "10")],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, FiscalError::Stock(_)), "{err}");

    let next = service
        .create(&invoice(&org, date(2025, 3, 1), vec![line("1", "10")]))
        .await
        .unwrap();
    assert_eq!(next.sequence(), 1);
}

/// Ledger that rejects every movement.
struct RejectingLedger;

impl StockLedger for RejectingLedger {
    fn record_movement<'a>(
        &'a self,
        _conn: &'a mut SqliteConnection,
        movement: &'a StockMovement,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send + 'a {
        async move { Err(StoreError::UnknownProduct(movement.product_id)) }
    }
}

#[tokio::test]
async fn test_failing_stock_ledger_rolls_back_cancellation() {
    let store = Store::in_memory().await.unwrap();
    let org = organization();
    let issuing = DocumentService::new(store.clone(), keys_for(&org), FiscalConfig::default());
    issuing.register_organization(&org).await.unwrap();
    let product = register_product(&issuing, &org, "10").await;
    let sale = issuing
        .create(&invoice(&org, date(2025, 3, 1), vec![product_line(product, "1", "10")]))
        .await
        .unwrap();

    let failing =
        DocumentService::with_stock_ledger(store, keys_for(&org), RejectingLedger, FiscalConfig::default());
    let err = failing.cancel(&sale.id, "voided", "manager").await.unwrap_err();
    assert!(matches!(err, FiscalError::Stock(_)));

    let stored = failing.get(&sale.id).await.unwrap();
    assert_eq!(stored.status, DocumentStatus::Issued);
    assert!(stored.cancellation.is_none());
    assert_eq!(failing.stock_level(&product).await.unwrap(), d("9"));
}
