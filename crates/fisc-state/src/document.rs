//! # Fiscal Document Lifecycle
//!
//! ## Rules
//!
//! - `issue()` is valid only from `Draft`.
//! - `cancel()` is valid only from `Issued`, only for fiscal document types,
//!   and requires a non-empty reason. Proformas are working documents and
//!   are never cancelled; they are superseded by conversion.
//! - `Cancelled` is terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fisc_core::{
    DocumentId, DocumentStatus, DocumentType, FiscalDocument, FiscalError, Timestamp,
    ValidationError,
};

// ─── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentLifecycleState {
    /// Built in memory, not yet numbered or persisted.
    Draft,
    /// Committed with its number (and signature, if fiscal).
    Issued,
    /// Voided. Terminal.
    Cancelled,
}

impl DocumentLifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The persisted status for this state. Drafts are never persisted.
    pub fn status(&self) -> Option<DocumentStatus> {
        match self {
            Self::Draft => None,
            Self::Issued => Some(DocumentStatus::Issued),
            Self::Cancelled => Some(DocumentStatus::Cancelled),
        }
    }
}

impl From<DocumentStatus> for DocumentLifecycleState {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Issued => Self::Issued,
            DocumentStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl std::fmt::Display for DocumentLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Issued => write!(f, "ISSUED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid document transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The document has already been cancelled.
    #[error("document {document} is already cancelled")]
    AlreadyCancelled { document: String },

    /// The document type has no cancellation (proformas).
    #[error("{document_type} documents cannot be cancelled")]
    NotCancellable { document_type: DocumentType },

    /// Cancellation reason is empty.
    #[error("a cancellation reason is required")]
    MissingReason,
}

impl From<LifecycleError> for FiscalError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::MissingReason => FiscalError::Validation(ValidationError::InvalidField {
                field: "reason",
                reason: "must not be empty".into(),
            }),
            other => FiscalError::InvalidTransition(other.to_string()),
        }
    }
}

// ─── Transition Records ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransitionRecord {
    pub from_state: DocumentLifecycleState,
    pub to_state: DocumentLifecycleState,
    pub timestamp: Timestamp,
    pub actor: String,
    pub reason: Option<String>,
}

// ─── Lifecycle ───────────────────────────────────────────────────────

/// A document's lifecycle state with the transitions applied in this unit
/// of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLifecycle {
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    /// Number for diagnostics; empty while the draft is unnumbered.
    pub label: String,
    pub state: DocumentLifecycleState,
    pub transitions: Vec<LifecycleTransitionRecord>,
}

impl DocumentLifecycle {
    /// A new in-memory draft.
    pub fn draft(document_id: DocumentId, document_type: DocumentType) -> Self {
        Self {
            document_id,
            document_type,
            label: String::new(),
            state: DocumentLifecycleState::Draft,
            transitions: Vec::new(),
        }
    }

    /// Rehydrate from a committed document.
    pub fn from_document(document: &FiscalDocument) -> Self {
        Self {
            document_id: document.id,
            document_type: document.document_type,
            label: document.number.to_string(),
            state: document.status.into(),
            transitions: Vec::new(),
        }
    }

    /// DRAFT → ISSUED, stamped at `at` (the system-entry time).
    pub fn issue(
        &mut self,
        at: Timestamp,
        actor: &str,
    ) -> Result<&LifecycleTransitionRecord, LifecycleError> {
        self.require_state(DocumentLifecycleState::Draft, DocumentLifecycleState::Issued)?;
        Ok(self.do_transition(DocumentLifecycleState::Issued, at, actor, None))
    }

    /// ISSUED → CANCELLED.
    pub fn cancel(
        &mut self,
        at: Timestamp,
        actor: &str,
        reason: &str,
    ) -> Result<&LifecycleTransitionRecord, LifecycleError> {
        if !self.document_type.is_fiscal() {
            return Err(LifecycleError::NotCancellable {
                document_type: self.document_type,
            });
        }
        self.require_state(DocumentLifecycleState::Issued, DocumentLifecycleState::Cancelled)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::MissingReason);
        }
        Ok(self.do_transition(
            DocumentLifecycleState::Cancelled,
            at,
            actor,
            Some(reason.to_string()),
        ))
    }

    /// Whether the document is in a state from which derivations (credit
    /// notes, debit notes, conversion) may start.
    pub fn accepts_derivation(&self) -> bool {
        self.state == DocumentLifecycleState::Issued
    }

    fn require_state(
        &self,
        expected: DocumentLifecycleState,
        target: DocumentLifecycleState,
    ) -> Result<(), LifecycleError> {
        if self.state.is_terminal() {
            return Err(LifecycleError::AlreadyCancelled {
                document: self.label.clone(),
            });
        }
        if self.state != expected {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    fn do_transition(
        &mut self,
        to: DocumentLifecycleState,
        at: Timestamp,
        actor: &str,
        reason: Option<String>,
    ) -> &LifecycleTransitionRecord {
        self.transitions.push(LifecycleTransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: at,
            actor: actor.to_string(),
            reason,
        });
        self.state = to;
        &self.transitions[self.transitions.len() - 1]
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        Timestamp::parse("2025-05-01T09:30:00Z").unwrap()
    }

    fn issued(document_type: DocumentType) -> DocumentLifecycle {
        let mut lc = DocumentLifecycle::draft(DocumentId::new(), document_type);
        lc.issue(ts(), "clerk").unwrap();
        lc.label = "FT/2025/000001".into();
        lc
    }

    #[test]
    fn test_draft_to_issued() {
        let mut lc = DocumentLifecycle::draft(DocumentId::new(), DocumentType::Invoice);
        let record = lc.issue(ts(), "clerk").unwrap().clone();
        assert_eq!(lc.state, DocumentLifecycleState::Issued);
        assert_eq!(record.from_state, DocumentLifecycleState::Draft);
        assert_eq!(record.actor, "clerk");
        assert_eq!(lc.state.status(), Some(DocumentStatus::Issued));
    }

    #[test]
    fn test_issue_twice_rejected() {
        let mut lc = issued(DocumentType::Invoice);
        let err = lc.issue(ts(), "clerk").unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cancel_records_reason_and_actor() {
        let mut lc = issued(DocumentType::InvoiceReceipt);
        let record = lc.cancel(ts(), "manager", "  wrong customer ").unwrap().clone();
        assert_eq!(lc.state, DocumentLifecycleState::Cancelled);
        assert_eq!(record.reason.as_deref(), Some("wrong customer"));
        assert_eq!(record.actor, "manager");
        assert_eq!(lc.transitions.len(), 2);
    }

    #[test]
    fn test_cancel_twice_rejected() {
        let mut lc = issued(DocumentType::Invoice);
        lc.cancel(ts(), "manager", "duplicate").unwrap();
        let err = lc.cancel(ts(), "manager", "again").unwrap_err();
        assert_eq!(
            err,
            LifecycleError::AlreadyCancelled {
                document: "FT/2025/000001".into()
            }
        );
    }

    #[test]
    fn test_cancel_draft_rejected() {
        let mut lc = DocumentLifecycle::draft(DocumentId::new(), DocumentType::Invoice);
        assert!(matches!(
            lc.cancel(ts(), "manager", "x"),
            Err(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_proforma_not_cancellable() {
        let mut lc = issued(DocumentType::Proforma);
        let err = lc.cancel(ts(), "manager", "not needed").unwrap_err();
        assert!(matches!(err, LifecycleError::NotCancellable { .. }));
        assert!(lc.accepts_derivation());
    }

    #[test]
    fn test_empty_reason_is_validation_error() {
        let mut lc = issued(DocumentType::Invoice);
        let err = lc.cancel(ts(), "manager", "   ").unwrap_err();
        assert_eq!(err, LifecycleError::MissingReason);
        assert_eq!(lc.state, DocumentLifecycleState::Issued);
        assert!(matches!(FiscalError::from(err), FiscalError::Validation(_)));
    }

    #[test]
    fn test_transition_error_maps_to_invalid_transition() {
        let err = LifecycleError::AlreadyCancelled {
            document: "FT/2025/000003".into(),
        };
        match FiscalError::from(err) {
            FiscalError::InvalidTransition(msg) => assert!(msg.contains("FT/2025/000003")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transition_record_serde() {
        let lc = issued(DocumentType::Invoice);
        let json = serde_json::to_string(&lc.transitions[0]).unwrap();
        let back: LifecycleTransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lc.transitions[0]);
    }
}
