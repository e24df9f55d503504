//! Errors raised while building or serializing an audit file.

use chrono::NaiveDate;
use fisc_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    /// The XML writer failed.
    #[error("XML serialization error: {0}")]
    Xml(String),

    /// The requested period is empty or reversed.
    #[error("invalid export period: {start} to {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<quick_xml::Error> for ExportError {
    fn from(e: quick_xml::Error) -> Self {
        ExportError::Xml(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ExportError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ExportError::Xml(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
