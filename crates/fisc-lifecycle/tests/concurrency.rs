//! Concurrent issuance against a file-backed database: numbers stay
//! contiguous and the chain stays verifiable.

mod common;

use std::sync::Arc;

use common::*;
use fisc_core::{DocumentType, FiscalConfig, Series};
use fisc_lifecycle::DocumentService;
use fisc_store::Store;
use proptest::prelude::*;

const TASKS: u32 = 6;
const PER_TASK: u32 = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuers_get_contiguous_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("fiscal.db").display());
    let store = Store::connect(&url).await.unwrap();
    let org = organization();
    let config = FiscalConfig {
        sequence_retry_limit: 20,
        ..FiscalConfig::default()
    };
    let service = Arc::new(DocumentService::new(store, keys_for(&org), config));
    service.register_organization(&org).await.unwrap();

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let service = Arc::clone(&service);
        let org = org.clone();
        handles.push(tokio::spawn(async move {
            let mut numbers = Vec::new();
            for i in 0..PER_TASK {
                let price = format!("{}.{:02}", task + 1, i);
                let doc = service
                    .create(&invoice(&org, date(2025, 3, 1), vec![line("1", &price)]))
                    .await
                    .unwrap();
                numbers.push(doc.sequence());
            }
            numbers
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_unstable();
    let expected: Vec<u32> = (1..=TASKS * PER_TASK).collect();
    assert_eq!(all, expected);

    let report = service
        .verify_series(&org.id, &Series::new(DocumentType::Invoice, 2025))
        .await
        .unwrap();
    assert_eq!(report.verified, TASKS * PER_TASK);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Interleaving valid and rejected issuances never leaves a gap.
    #[test]
    fn rejected_issuances_leave_no_gaps(valid in proptest::collection::vec(any::<bool>(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (service, org) = service().await;
            let source = service
                .create(&invoice(&org, date(2025, 3, 1), vec![line("100", "1")]))
                .await
                .unwrap();

            let mut issued = Vec::new();
            for ok in valid {
                let quantity = if ok { "1" } else { "1000" };
                let result = service
                    .derive_credit_note(&fisc_lifecycle::CreditNoteInput {
                        source_id: source.id,
                        lines: vec![fisc_lifecycle::CreditSelection {
                            source_line_id: source.lines[0].id,
                            quantity: Some(d(quantity)),
                        }],
                        reason: "return".into(),
                        issue_date: Some(date(2025, 3, 2)),
                        actor: "clerk".into(),
                    })
                    .await;
                match result {
                    Ok(note) => issued.push(note.sequence()),
                    Err(e) => assert!(!ok, "valid credit rejected: {e}"),
                }
            }
            let expected: Vec<u32> = (1..=issued.len() as u32).collect();
            assert_eq!(issued, expected);

            let nc = Series::new(DocumentType::CreditNote, 2025);
            if !expected.is_empty() {
                let report = service.verify_series(&org.id, &nc).await.unwrap();
                assert_eq!(report.verified as usize, expected.len());
            }
        });
    }
}
