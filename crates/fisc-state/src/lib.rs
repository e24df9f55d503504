//! # fisc-state: Document Lifecycle State Machine
//!
//! Implements the lifecycle of a fiscal document:
//!
//! ```text
//! Draft (in memory) ──issue──▶ Issued ──cancel──▶ Cancelled (terminal)
//! ```
//!
//! A document exists only in memory while it is a draft; it reaches storage
//! already issued, inside the issuing transaction. Cancellation happens at
//! most once and is never reverted. Documents are never deleted, so there is
//! no transition out of `Cancelled`.
//!
//! The crate is pure: no I/O, no clock other than the timestamp stamped on
//! transition records. The lifecycle manager consults it before every
//! status write.

pub mod document;

pub use document::{
    DocumentLifecycle, DocumentLifecycleState, LifecycleError, LifecycleTransitionRecord,
};
