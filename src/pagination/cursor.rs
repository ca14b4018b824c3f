//! `since` cursors are event timestamps rendered as RFC 3339.
//!
//! Fractional seconds are kept at full precision so a cursor always compares
//! equal to the event timestamp it was taken from.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidCursor(format!("'{}': {}", raw, e)))
}
