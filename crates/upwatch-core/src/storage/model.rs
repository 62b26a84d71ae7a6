//! Persisted record types.
//!
//! The on-disk JSON field names (`timestamp`, `timezone`, `data.status`,
//! `data.responseTimeMs`) are shared with logs written by earlier versions of
//! the monitor, so existing log directories load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single probe. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// When the probe was dispatched.
    #[serde(rename = "timestamp")]
    pub instant: DateTime<Utc>,
    #[serde(rename = "status")]
    pub success: bool,
    /// Dispatch to response headers (or to the timeout bound).
    #[serde(rename = "responseTimeMs")]
    pub latency_ms: u64,
    #[serde(
        rename = "statusCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_code: Option<u16>,
}

/// A probe result as persisted in a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Authoritative instant for bucketing.
    #[serde(rename = "timestamp")]
    pub recorded_at: DateTime<Utc>,
    /// Zone configured when the record was written. Provenance only.
    #[serde(rename = "timezone", default)]
    pub timezone_label: String,
    #[serde(rename = "data")]
    pub probe: ProbeResult,
}

impl LogRecord {
    pub fn new(recorded_at: DateTime<Utc>, timezone_label: impl Into<String>, probe: ProbeResult) -> Self {
        Self {
            recorded_at,
            timezone_label: timezone_label.into(),
            probe,
        }
    }
}

/// One date-named file and its records in append order.
///
/// `name` is the date key chosen when the file was created; it does not have
/// to match the local date of every record inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,
    pub records: Vec<LogRecord>,
}
