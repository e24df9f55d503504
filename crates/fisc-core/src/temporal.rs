//! # Temporal Types: UTC System-Entry Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to seconds, used for
//! the system-entry date of a document and for cancellation times.
//!
//! ## Security Invariant
//!
//! The system-entry date is part of the signing input, rendered as
//! `YYYY-MM-DDTHH:MM:SS`. A stored value with sub-second precision or a
//! local offset would render differently at verification time and break the
//! chain, so both are dropped at construction.
//!
//! Two renderings exist:
//!
//! - [`Timestamp::to_iso8601()`] → `2025-03-01T10:15:00Z`, used for storage.
//! - [`Timestamp::to_entry_string()`] → `2025-03-01T10:15:00`, used in the
//!   signing input and the audit export.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with a `Z` suffix. Offsets are rejected, as
    /// are date-only strings.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::InvalidField {
                field: "timestamp",
                reason: format!("must use Z suffix (UTC only), got {s:?}"),
            });
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| ValidationError::InvalidField {
            field: "timestamp",
            reason: format!("invalid RFC 3339 timestamp {s:?}: {e}"),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Parse the `YYYY-MM-DDTHH:MM:SS` entry rendering, interpreted as UTC.
    pub fn parse_entry(s: &str) -> Result<Self, ValidationError> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(|naive| Self(naive.and_utc()))
            .map_err(|e| ValidationError::InvalidField {
                field: "timestamp",
                reason: format!("invalid entry timestamp {s:?}: {e}"),
            })
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Calendar date of the timestamp in UTC.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Render as ISO8601 with Z suffix (e.g., `2025-03-01T10:15:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Render without offset (e.g., `2025-03-01T10:15:00`).
    pub fn to_entry_string(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Render a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| ValidationError::InvalidField {
        field: "date",
        reason: format!("invalid date {s:?}: {e}"),
    })
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
