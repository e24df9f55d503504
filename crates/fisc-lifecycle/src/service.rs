//! # Document Lifecycle Manager
//!
//! [`DocumentService`] is the only writer of document state. Each operation
//! is one all-or-nothing transaction:
//!
//! ```text
//! issue:   allocate number → load/validate source → locate predecessor
//!          → sign → insert document + lines → stock movements → commit
//! cancel:  load → state check → compensating stock movements
//!          → conditional ISSUED → CANCELLED update → commit
//! ```
//!
//! The number allocation is the first write of an issuing transaction, so
//! concurrent issuers queue on the SQLite write lock there. A transaction
//! that loses the race surfaces as [`FiscalError::SequenceConflict`] and is
//! retried from scratch, up to `sequence_retry_limit` attempts.
//!
//! The service owns its storage handle, key provider and stock ledger;
//! nothing is global, so tests construct as many independent services as
//! they need.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use fisc_core::money::round_money;
use fisc_core::{
    Counterparty, DocumentId, DocumentLine, DocumentNumber, DocumentStatus, DocumentTotals,
    DocumentType, FiscalConfig, FiscalDocument, FiscalError, LineAmounts, LineId, Organization,
    OrganizationId, PaymentMethod, ProductId, Series, SourceReference, Timestamp,
    ValidationError,
};
use fisc_crypto::{ChainReport, KeyProvider};
use fisc_state::DocumentLifecycle;
use fisc_store::{
    documents, organizations, sequence, stock, CreditedAmounts, Product, SqliteConnection,
    SqliteStockLedger, StockLedger, StockMovement, Store, StoreError,
};
use rust_decimal::Decimal;

use crate::chain::{self, ChainPosition};
use crate::input::{
    ConversionInput, CreateDocumentInput, CreditNoteInput, CreditSelection, DebitNoteInput,
};
use crate::retry::with_retry;
use crate::validation;

/// Issues, cancels, derives and verifies fiscal documents.
pub struct DocumentService<K, S = SqliteStockLedger> {
    store: Store,
    keys: K,
    stock: S,
    config: FiscalConfig,
}

impl<K: KeyProvider> DocumentService<K, SqliteStockLedger> {
    /// A service recording stock in the same database.
    pub fn new(store: Store, keys: K, config: FiscalConfig) -> Self {
        Self::with_stock_ledger(store, keys, SqliteStockLedger, config)
    }
}

impl<K: KeyProvider, S: StockLedger> DocumentService<K, S> {
    pub fn with_stock_ledger(store: Store, keys: K, stock: S, config: FiscalConfig) -> Self {
        Self {
            store,
            keys,
            stock,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &FiscalConfig {
        &self.config
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    // ─── Master data ─────────────────────────────────────────────────

    /// Register an issuing organization.
    pub async fn register_organization(&self, organization: &Organization) -> Result<(), FiscalError> {
        if organization.name.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "name",
                reason: "must not be empty".into(),
            }
            .into());
        }
        let mut conn = self.store.acquire().await?;
        organizations::insert(&mut conn, organization).await?;
        Ok(())
    }

    pub async fn organization(&self, id: &OrganizationId) -> Result<Organization, FiscalError> {
        let mut conn = self.store.acquire().await?;
        organizations::get(&mut conn, id)
            .await?
            .ok_or_else(|| FiscalError::not_found("organization", id))
    }

    /// Register a product with its opening stock level. Stock movements for
    /// unregistered products are rejected.
    pub async fn register_product(&self, product: &Product) -> Result<(), FiscalError> {
        self.organization(&product.organization_id).await?;
        let mut conn = self.store.acquire().await?;
        stock::upsert_product(&mut conn, product).await?;
        tracing::info!(product = %product.id, code = %product.code, "product registered");
        Ok(())
    }

    pub async fn stock_level(&self, product: &ProductId) -> Result<Decimal, FiscalError> {
        let mut conn = self.store.acquire().await?;
        stock::stock_level(&mut conn, product)
            .await?
            .ok_or_else(|| FiscalError::not_found("product", product))
    }

    // ─── Issuance ────────────────────────────────────────────────────

    /// Validate, number, sign and persist a new document.
    pub async fn create(&self, input: &CreateDocumentInput) -> Result<FiscalDocument, FiscalError> {
        let actor = validation::require_actor(&input.actor)?;
        let counterparty = match &input.counterparty {
            Some(counterparty) => counterparty.clone(),
            None if input.document_type == DocumentType::Invoice => {
                return Err(ValidationError::MissingCounterpartyTaxId.into())
            }
            None => Counterparty::final_consumer(),
        };
        let lines = validation::build_lines(&input.lines)?;
        validation::check_document(
            input.document_type,
            &counterparty,
            &DocumentTotals::from_lines(&lines),
            &self.config,
        )?;
        self.organization(&input.organization_id).await?;

        let plan = Plan::new(
            input.organization_id,
            input.document_type,
            input.issue_date,
            actor,
            Derivation::None {
                input,
                counterparty,
                lines,
            },
        );
        self.issue(&plan).await
    }

    /// Credit selected lines (full or partial quantity) of an issued sale.
    pub async fn derive_credit_note(&self, input: &CreditNoteInput) -> Result<FiscalDocument, FiscalError> {
        let actor = validation::require_actor(&input.actor)?;
        let reason = validation::require_reason(&input.reason)?;
        if input.lines.is_empty() {
            return Err(ValidationError::NoLines.into());
        }
        let source = self.source(&input.source_id).await?;

        let plan = Plan::new(
            source.organization_id,
            DocumentType::CreditNote,
            input.issue_date,
            actor,
            Derivation::CreditNote {
                source_id: source.id,
                selections: &input.lines,
                reason,
            },
        );
        self.issue(&plan).await
    }

    /// Charge extra lines against an issued sale. Debit note lines never
    /// move stock.
    pub async fn derive_debit_note(&self, input: &DebitNoteInput) -> Result<FiscalDocument, FiscalError> {
        let actor = validation::require_actor(&input.actor)?;
        let reason = validation::require_reason(&input.reason)?;
        let mut lines = validation::build_lines(&input.lines)?;
        for line in &mut lines {
            line.product_id = None;
        }
        let source = self.source(&input.source_id).await?;

        let plan = Plan::new(
            source.organization_id,
            DocumentType::DebitNote,
            input.issue_date,
            actor,
            Derivation::DebitNote {
                source_id: source.id,
                lines,
                reason,
            },
        );
        self.issue(&plan).await
    }

    /// Issue an invoice-receipt from an issued proforma. The proforma itself
    /// is left unchanged.
    pub async fn convert_proforma_to_invoice(
        &self,
        input: &ConversionInput,
    ) -> Result<FiscalDocument, FiscalError> {
        let actor = validation::require_actor(&input.actor)?;
        let proforma = self.source(&input.proforma_id).await?;

        let plan = Plan::new(
            proforma.organization_id,
            DocumentType::InvoiceReceipt,
            input.issue_date,
            actor,
            Derivation::Conversion {
                proforma_id: proforma.id,
                payment_method: input.payment_method,
            },
        );
        self.issue(&plan).await
    }

    async fn issue(&self, plan: &Plan<'_>) -> Result<FiscalDocument, FiscalError> {
        let series_key = plan.series.key();
        with_retry(&series_key, self.config.sequence_retry_limit, move || {
            self.issue_once(plan)
        })
        .await
    }

    async fn issue_once(&self, plan: &Plan<'_>) -> Result<FiscalDocument, FiscalError> {
        let mut tx = self.store.begin().await?;

        let sequence = sequence::allocate(&mut *tx, &plan.organization_id, &plan.series).await?;
        let number = DocumentNumber::new(&plan.series, sequence);
        let draft = self.prepare(&mut *tx, plan).await?;

        let system_entry = Timestamp::now();
        let position = if plan.document_type.is_fiscal() {
            chain::locate(&mut *tx, &plan.organization_id, &plan.series, sequence).await?
        } else {
            ChainPosition::default()
        };
        validation::check_chronology(plan.issue_date, system_entry, position.previous.as_ref())?;

        let mut document = draft.into_document(plan, number, system_entry);
        DocumentLifecycle::draft(document.id, document.document_type)
            .issue(system_entry, &plan.actor)?;
        if document.is_fiscal() {
            chain::sign(&self.keys, &mut document, &position)?;
        }

        documents::insert(&mut *tx, &document).await?;
        self.move_stock(&mut *tx, &document, false).await?;
        tx.commit().await.map_err(StoreError::from)?;

        tracing::info!(
            document = %document.number,
            organization = %document.organization_id,
            series = %plan.series,
            sequence,
            gross_total = %document.totals.grand_total,
            "document issued"
        );
        Ok(document)
    }

    /// Build the document content inside the issuing transaction, so source
    /// checks see the same state the insert commits against.
    async fn prepare(&self, conn: &mut SqliteConnection, plan: &Plan<'_>) -> Result<Draft, FiscalError> {
        let draft = match &plan.derivation {
            Derivation::None {
                input,
                counterparty,
                lines,
            } => Draft {
                counterparty: counterparty.clone(),
                lines: lines.clone(),
                due_date: input.due_date,
                payment_method: input.payment_method,
                notes: input.notes.clone(),
                source: None,
            },
            Derivation::CreditNote {
                source_id,
                selections,
                reason,
            } => {
                let source = load_source(conn, source_id).await?;
                require_sale_source(&source)?;
                let credited = documents::credited_by_line(conn, source_id).await?;
                Draft {
                    counterparty: source.counterparty.clone(),
                    lines: credit_lines(&source, selections, &credited)?,
                    due_date: None,
                    payment_method: source.payment_method,
                    notes: None,
                    source: Some(source_reference(&source, Some(reason.clone()))),
                }
            }
            Derivation::DebitNote {
                source_id,
                lines,
                reason,
            } => {
                let source = load_source(conn, source_id).await?;
                require_sale_source(&source)?;
                Draft {
                    counterparty: source.counterparty.clone(),
                    lines: lines.clone(),
                    due_date: None,
                    payment_method: source.payment_method,
                    notes: None,
                    source: Some(source_reference(&source, Some(reason.clone()))),
                }
            }
            Derivation::Conversion {
                proforma_id,
                payment_method,
            } => {
                let proforma = load_source(conn, proforma_id).await?;
                if proforma.document_type != DocumentType::Proforma {
                    return Err(ValidationError::InvalidSource {
                        reason: format!("{} is not a proforma", proforma.number),
                    }
                    .into());
                }
                if !DocumentLifecycle::from_document(&proforma).accepts_derivation() {
                    return Err(ValidationError::InvalidSource {
                        reason: format!("{} is cancelled", proforma.number),
                    }
                    .into());
                }
                let conversions = documents::active_derivations(conn, proforma_id).await?;
                if let Some((_, number)) = conversions.first() {
                    return Err(FiscalError::InvalidTransition(format!(
                        "{} was already converted to {number}",
                        proforma.number
                    )));
                }
                Draft {
                    counterparty: proforma.counterparty.clone(),
                    lines: proforma
                        .lines
                        .iter()
                        .map(|line| DocumentLine {
                            id: LineId::new(),
                            source_line_id: None,
                            ..line.clone()
                        })
                        .collect(),
                    due_date: proforma.due_date,
                    payment_method: payment_method.or(proforma.payment_method),
                    notes: proforma.notes.clone(),
                    source: Some(source_reference(&proforma, None)),
                }
            }
        };

        if !matches!(plan.derivation, Derivation::None { .. }) {
            validation::check_document(
                plan.document_type,
                &draft.counterparty,
                &DocumentTotals::from_lines(&draft.lines),
                &self.config,
            )?;
        }
        Ok(draft)
    }

    // ─── Cancellation ────────────────────────────────────────────────

    /// Cancel an issued fiscal document, reversing its stock movements.
    pub async fn cancel(
        &self,
        id: &DocumentId,
        reason: &str,
        actor: &str,
    ) -> Result<FiscalDocument, FiscalError> {
        let reason = validation::require_reason(reason)?;
        let actor = validation::require_actor(actor)?;
        let (reason, actor) = (reason.as_str(), actor.as_str());
        with_retry(&id.to_string(), self.config.sequence_retry_limit, move || {
            self.cancel_once(id, reason, actor)
        })
        .await
        .map_err(|e| cancellation_contended(id, e))
    }

    async fn cancel_once(
        &self,
        id: &DocumentId,
        reason: &str,
        actor: &str,
    ) -> Result<FiscalDocument, FiscalError> {
        let mut tx = self.store.begin().await?;

        let mut document = documents::get(&mut *tx, id)
            .await?
            .ok_or_else(|| FiscalError::not_found("document", id))?;
        let mut lifecycle = DocumentLifecycle::from_document(&document);
        let record = lifecycle.cancel(Timestamp::now(), actor, reason)?.clone();

        let derived = documents::active_derivations(&mut *tx, id).await?;
        if !derived.is_empty() {
            let numbers: Vec<&str> = derived.iter().map(|(_, n)| n.as_str()).collect();
            return Err(FiscalError::InvalidTransition(format!(
                "{} has active derived documents: {}",
                document.number,
                numbers.join(", ")
            )));
        }

        self.move_stock(&mut *tx, &document, true).await?;

        let cancellation = fisc_core::Cancellation {
            reason: record.reason.unwrap_or_default(),
            cancelled_at: record.timestamp,
            cancelled_by: record.actor,
        };
        if !documents::mark_cancelled(&mut *tx, id, &cancellation).await? {
            return Err(FiscalError::InvalidTransition(format!(
                "{} is no longer issued",
                document.number
            )));
        }
        tx.commit().await.map_err(StoreError::from)?;

        tracing::info!(
            document = %document.number,
            organization = %document.organization_id,
            actor = %cancellation.cancelled_by,
            "document cancelled"
        );
        document.status = DocumentStatus::Cancelled;
        document.cancellation = Some(cancellation);
        Ok(document)
    }

    /// Record one movement per product line: the type's direction at
    /// issuance, its negation on cancellation.
    async fn move_stock(
        &self,
        conn: &mut SqliteConnection,
        document: &FiscalDocument,
        reversal: bool,
    ) -> Result<(), FiscalError> {
        let Some(direction) = document.document_type.stock_direction() else {
            return Ok(());
        };
        let reason = if reversal {
            format!("cancellation of {}", document.number)
        } else {
            format!("{} {}", document.document_type.as_str(), document.number)
        };
        for line in &document.lines {
            let Some(product_id) = line.product_id else {
                continue;
            };
            let delta = direction.delta(line.quantity);
            let movement = StockMovement {
                product_id,
                delta: if reversal { -delta } else { delta },
                reason: reason.clone(),
                reference_document_id: Some(document.id),
            };
            self.stock.record_movement(&mut *conn, &movement).await?;
        }
        Ok(())
    }

    // ─── Queries & verification ──────────────────────────────────────

    pub async fn get(&self, id: &DocumentId) -> Result<FiscalDocument, FiscalError> {
        let mut conn = self.store.acquire().await?;
        documents::get(&mut conn, id)
            .await?
            .ok_or_else(|| FiscalError::not_found("document", id))
    }

    pub async fn get_by_number(
        &self,
        organization: &OrganizationId,
        number: &DocumentNumber,
    ) -> Result<FiscalDocument, FiscalError> {
        let mut conn = self.store.acquire().await?;
        documents::get_by_number(&mut conn, organization, number)
            .await?
            .ok_or_else(|| FiscalError::not_found("document", number))
    }

    /// Re-derive the signing input of a stored document from its fields and
    /// its predecessor's signature, and check the signature.
    pub async fn verify_document(&self, id: &DocumentId) -> Result<(), FiscalError> {
        let mut conn = self.store.acquire().await?;
        let document = documents::get(&mut conn, id)
            .await?
            .ok_or_else(|| FiscalError::not_found("document", id))?;
        require_signed_type(document.document_type)?;
        let position = chain::locate(
            &mut conn,
            &document.organization_id,
            document.series(),
            document.sequence(),
        )
        .await?;
        fisc_crypto::verify_link(&self.keys, &document, position.previous_signature())
    }

    /// Walk a whole series and report the first broken link.
    pub async fn verify_series(
        &self,
        organization: &OrganizationId,
        series: &Series,
    ) -> Result<ChainReport, FiscalError> {
        require_signed_type(series.document_type)?;
        let mut conn = self.store.acquire().await?;
        let docs = documents::list_series(&mut conn, organization, series).await?;
        fisc_crypto::verify_chain(&self.keys, *series, &docs)
    }

    /// Verify every signed series the organization has issued in.
    pub async fn verify_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<ChainReport>, FiscalError> {
        let series = {
            let mut conn = self.store.acquire().await?;
            documents::series_in_use(&mut conn, organization).await?
        };
        let mut reports = Vec::new();
        for s in series.iter().filter(|s| s.document_type.is_fiscal()) {
            reports.push(self.verify_series(organization, s).await?);
        }
        Ok(reports)
    }

    async fn source(&self, id: &DocumentId) -> Result<FiscalDocument, FiscalError> {
        self.get(id).await.map_err(|e| match e {
            FiscalError::NotFound { .. } => ValidationError::InvalidSource {
                reason: format!("document {id} does not exist"),
            }
            .into(),
            other => other,
        })
    }
}

impl<K, S> std::fmt::Debug for DocumentService<K, S>
where
    K: KeyProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("store", &self.store)
            .field("keys", &self.keys.provider_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Issuance plan ───────────────────────────────────────────────────

/// Everything an issuing attempt needs, fixed before the first attempt so
/// that retries issue the same document.
struct Plan<'a> {
    organization_id: OrganizationId,
    document_type: DocumentType,
    series: Series,
    issue_date: NaiveDate,
    actor: String,
    derivation: Derivation<'a>,
}

impl<'a> Plan<'a> {
    fn new(
        organization_id: OrganizationId,
        document_type: DocumentType,
        issue_date: Option<NaiveDate>,
        actor: String,
        derivation: Derivation<'a>,
    ) -> Self {
        let issue_date = issue_date.unwrap_or_else(|| Timestamp::now().date());
        Self {
            organization_id,
            document_type,
            series: Series::for_issue_date(document_type, issue_date),
            issue_date,
            actor,
            derivation,
        }
    }
}

enum Derivation<'a> {
    None {
        input: &'a CreateDocumentInput,
        counterparty: Counterparty,
        lines: Vec<DocumentLine>,
    },
    CreditNote {
        source_id: DocumentId,
        selections: &'a [CreditSelection],
        reason: String,
    },
    DebitNote {
        source_id: DocumentId,
        lines: Vec<DocumentLine>,
        reason: String,
    },
    Conversion {
        proforma_id: DocumentId,
        payment_method: Option<PaymentMethod>,
    },
}

/// Document content resolved inside the transaction.
struct Draft {
    counterparty: Counterparty,
    lines: Vec<DocumentLine>,
    due_date: Option<NaiveDate>,
    payment_method: Option<PaymentMethod>,
    notes: Option<String>,
    source: Option<SourceReference>,
}

impl Draft {
    fn into_document(self, plan: &Plan<'_>, number: DocumentNumber, system_entry: Timestamp) -> FiscalDocument {
        FiscalDocument {
            id: DocumentId::new(),
            organization_id: plan.organization_id,
            document_type: plan.document_type,
            number,
            issue_date: plan.issue_date,
            system_entry_date: system_entry,
            due_date: self.due_date,
            counterparty: self.counterparty,
            totals: DocumentTotals::from_lines(&self.lines),
            lines: self.lines,
            signature: None,
            signature_key_version: None,
            signature_key_owner: None,
            status: DocumentStatus::Issued,
            cancellation: None,
            source: self.source,
            payment_method: self.payment_method,
            payment_status: plan.document_type.default_payment_status(),
            notes: self.notes,
            created_by: plan.actor.clone(),
        }
    }
}

// ─── Derivation helpers ──────────────────────────────────────────────

async fn load_source(conn: &mut SqliteConnection, id: &DocumentId) -> Result<FiscalDocument, FiscalError> {
    documents::get(conn, id).await?.ok_or_else(|| {
        ValidationError::InvalidSource {
            reason: format!("document {id} does not exist"),
        }
        .into()
    })
}

fn require_sale_source(source: &FiscalDocument) -> Result<(), ValidationError> {
    if !source.document_type.is_sale() {
        return Err(ValidationError::InvalidSource {
            reason: format!(
                "{} is a {} and cannot be credited or debited",
                source.number,
                source.document_type.as_str()
            ),
        });
    }
    if !DocumentLifecycle::from_document(source).accepts_derivation() {
        return Err(ValidationError::InvalidSource {
            reason: format!("{} is cancelled", source.number),
        });
    }
    Ok(())
}

fn require_signed_type(document_type: DocumentType) -> Result<(), FiscalError> {
    if document_type.is_fiscal() {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: "document_type",
            reason: format!("{} documents are not signed", document_type.as_str()),
        }
        .into())
    }
}

fn source_reference(source: &FiscalDocument, reason: Option<String>) -> SourceReference {
    SourceReference {
        document_id: source.id,
        document_number: source.number,
        reason,
    }
}

/// A cancellation that keeps losing to concurrent writers is a storage
/// failure on that document, not a conflict on any series.
fn cancellation_contended(id: &DocumentId, err: FiscalError) -> FiscalError {
    match err {
        FiscalError::SequenceConflict { attempts, .. } => FiscalError::Storage(format!(
            "cancellation of document {id} still contended after {attempts} attempts"
        )),
        other => other,
    }
}

/// Credit-note lines for `selections`, bounded by what is not yet credited.
///
/// A partial credit is priced like a new line at the source's unit price,
/// with the discount pro-rated, then capped at the net, tax and discount
/// still left on the source line. A credit that takes everything left on a
/// line receives the exact remaining amounts, so rounding across several
/// partial credits never adds up to more than the source line.
fn credit_lines(
    source: &FiscalDocument,
    selections: &[CreditSelection],
    credited: &HashMap<LineId, CreditedAmounts>,
) -> Result<Vec<DocumentLine>, ValidationError> {
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(selections.len());

    for (selection, line_number) in selections.iter().zip(1u32..) {
        let original = source
            .lines
            .iter()
            .find(|l| l.id == selection.source_line_id)
            .ok_or_else(|| ValidationError::InvalidSource {
                reason: format!("line {} is not on {}", selection.source_line_id, source.number),
            })?;
        if !seen.insert(original.id) {
            return Err(ValidationError::InvalidLine {
                line: line_number,
                reason: format!("source line {} selected twice", original.line_number),
            });
        }

        let already = credited.get(&original.id).copied().unwrap_or_default();
        let remaining = original.quantity - already.quantity;
        let requested = selection.quantity.unwrap_or(remaining);
        if remaining <= Decimal::ZERO || requested > remaining {
            return Err(ValidationError::OverCredit {
                line: original.line_number,
                requested,
                remaining: remaining.max(Decimal::ZERO),
            });
        }
        if requested <= Decimal::ZERO {
            return Err(ValidationError::InvalidLine {
                line: line_number,
                reason: "credited quantity must be positive".into(),
            });
        }

        let (discount, tax_amount, line_total) = if requested == remaining {
            (
                original.discount - already.discount,
                original.tax_amount - already.tax,
                original.line_total - already.total,
            )
        } else {
            let discount = round_money(original.discount * requested / original.quantity);
            let amounts = LineAmounts::compute(requested, original.unit_price, discount, original.tax_rate);
            let net_left = original.net_amount() - (already.total - already.tax);
            let net = amounts.net.min(net_left).max(Decimal::ZERO);
            let tax = amounts.tax.min(original.tax_amount - already.tax).max(Decimal::ZERO);
            let discount = discount.min(original.discount - already.discount).max(Decimal::ZERO);
            (discount, tax, net + tax)
        };

        lines.push(DocumentLine {
            id: LineId::new(),
            line_number,
            product_id: original.product_id,
            code: original.code.clone(),
            name: original.name.clone(),
            quantity: requested,
            unit_price: original.unit_price,
            tax_rate: original.tax_rate,
            exemption: original.exemption.clone(),
            discount,
            tax_amount,
            line_total,
            source_line_id: Some(original.id),
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisc_core::TaxId;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn source_with_line(quantity: &str, price: &str, discount: &str) -> FiscalDocument {
        let amounts = LineAmounts::compute(d(quantity), d(price), d(discount), d("23"));
        let line = DocumentLine {
            id: LineId::new(),
            line_number: 1,
            product_id: None,
            code: "SKU".into(),
            name: "Item".into(),
            quantity: d(quantity),
            unit_price: d(price),
            tax_rate: d("23"),
            exemption: None,
            discount: round_money(d(discount)),
            tax_amount: amounts.tax,
            line_total: amounts.total,
            source_line_id: None,
        };
        let series = Series::new(DocumentType::Invoice, 2025);
        FiscalDocument {
            id: DocumentId::new(),
            organization_id: OrganizationId::new(),
            document_type: DocumentType::Invoice,
            number: DocumentNumber::new(&series, 1),
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            system_entry_date: Timestamp::parse("2025-01-02T10:00:00Z").unwrap(),
            due_date: None,
            counterparty: Counterparty {
                customer_id: None,
                name: "Ana".into(),
                tax_id: Some(TaxId::parse("123456789").unwrap()),
                address: None,
                phone: None,
                email: None,
            },
            totals: DocumentTotals::from_lines(std::slice::from_ref(&line)),
            lines: vec![line],
            signature: Some("sig".into()),
            signature_key_version: Some(1),
            signature_key_owner: Some(fisc_core::KeyOwner::Organization),
            status: DocumentStatus::Issued,
            cancellation: None,
            source: None,
            payment_method: None,
            payment_status: fisc_core::PaymentStatus::Pending,
            notes: None,
            created_by: "clerk".into(),
        }
    }

    fn select(source: &FiscalDocument, quantity: Option<&str>) -> Vec<CreditSelection> {
        vec![CreditSelection {
            source_line_id: source.lines[0].id,
            quantity: quantity.map(d),
        }]
    }

    fn add(credited: &mut HashMap<LineId, CreditedAmounts>, line: &DocumentLine) {
        let entry = credited.entry(line.source_line_id.unwrap()).or_default();
        entry.quantity += line.quantity;
        entry.discount += line.discount;
        entry.tax += line.tax_amount;
        entry.total += line.line_total;
    }

    #[test]
    fn exhausted_cancellation_retry_is_reported_as_storage_error() {
        let id = DocumentId::new();
        let err = cancellation_contended(
            &id,
            FiscalError::SequenceConflict {
                series: id.to_string(),
                attempts: 5,
            },
        );
        match err {
            FiscalError::Storage(message) => {
                assert!(message.contains(&id.to_string()));
                assert!(message.contains("5 attempts"));
            }
            other => panic!("expected storage error, got {other:?}"),
        }

        let untouched = cancellation_contended(&id, FiscalError::Signing("no key".into()));
        assert!(matches!(untouched, FiscalError::Signing(_)));
    }

    #[test]
    fn full_credit_copies_source_amounts() {
        let source = source_with_line("3", "10", "1.50");
        let lines = credit_lines(&source, &select(&source, None), &HashMap::new()).unwrap();
        assert_eq!(lines[0].quantity, d("3"));
        assert_eq!(lines[0].discount, source.lines[0].discount);
        assert_eq!(lines[0].tax_amount, source.lines[0].tax_amount);
        assert_eq!(lines[0].line_total, source.lines[0].line_total);
        assert_eq!(lines[0].source_line_id, Some(source.lines[0].id));
    }

    #[test]
    fn partial_credits_never_exceed_source_line() {
        // 3 × 3.33 with a 1.00 discount: thirds do not round evenly.
        let source = source_with_line("3", "3.33", "1");
        let mut credited = HashMap::new();
        let mut total = Decimal::ZERO;
        for quantity in [Some("1"), Some("1"), None] {
            let lines = credit_lines(&source, &select(&source, quantity), &credited).unwrap();
            total += lines[0].line_total;
            add(&mut credited, &lines[0]);
        }
        assert_eq!(total, source.lines[0].line_total);
        assert_eq!(credited[&source.lines[0].id].quantity, d("3"));

        let err = credit_lines(&source, &select(&source, Some("0.001")), &credited).unwrap_err();
        assert!(matches!(err, ValidationError::OverCredit { line: 1, .. }));
    }

    #[test]
    fn sub_cent_partial_credits_are_capped_at_source_value() {
        // 3 × 0.01 at 23%: every half unit rounds up to a full cent.
        let source = source_with_line("3", "0.01", "0");
        let line = &source.lines[0];
        let mut credited = HashMap::new();
        let mut total = Decimal::ZERO;
        let mut tax = Decimal::ZERO;
        for quantity in [Some("0.5"), Some("0.5"), Some("0.5"), Some("0.5"), Some("0.5"), None] {
            let lines = credit_lines(&source, &select(&source, quantity), &credited).unwrap();
            assert!(lines[0].line_total >= Decimal::ZERO);
            assert!(lines[0].tax_amount >= Decimal::ZERO);
            total += lines[0].line_total;
            tax += lines[0].tax_amount;
            assert!(total <= line.line_total, "credited {total} of {}", line.line_total);
            add(&mut credited, &lines[0]);
        }
        assert_eq!(total, line.line_total);
        assert_eq!(tax, line.tax_amount);
        assert_eq!(credited[&line.id].quantity, d("3"));
    }

    #[test]
    fn over_credit_reports_remaining() {
        let source = source_with_line("2", "10", "0");
        let mut credited = HashMap::new();
        let first = credit_lines(&source, &select(&source, Some("1.5")), &credited).unwrap();
        add(&mut credited, &first[0]);

        let err = credit_lines(&source, &select(&source, Some("1")), &credited).unwrap_err();
        assert_eq!(
            err,
            ValidationError::OverCredit {
                line: 1,
                requested: d("1"),
                remaining: d("0.5"),
            }
        );
    }

    #[test]
    fn unknown_or_duplicate_lines_are_rejected() {
        let source = source_with_line("2", "10", "0");
        let unknown = vec![CreditSelection {
            source_line_id: LineId::new(),
            quantity: None,
        }];
        assert!(matches!(
            credit_lines(&source, &unknown, &HashMap::new()),
            Err(ValidationError::InvalidSource { .. })
        ));

        let mut twice = select(&source, Some("1"));
        twice.extend(select(&source, Some("1")));
        assert!(matches!(
            credit_lines(&source, &twice, &HashMap::new()),
            Err(ValidationError::InvalidLine { line: 2, .. })
        ));
    }

    #[test]
    fn zero_quantity_credit_is_rejected() {
        let source = source_with_line("2", "10", "0");
        assert!(matches!(
            credit_lines(&source, &select(&source, Some("0")), &HashMap::new()),
            Err(ValidationError::InvalidLine { .. })
        ));
    }

    #[test]
    fn only_issued_sales_accept_notes() {
        let mut source = source_with_line("1", "1", "0");
        assert!(require_sale_source(&source).is_ok());

        source.status = DocumentStatus::Cancelled;
        assert!(require_sale_source(&source).is_err());

        source.status = DocumentStatus::Issued;
        source.document_type = DocumentType::CreditNote;
        assert!(require_sale_source(&source).is_err());
    }
}
