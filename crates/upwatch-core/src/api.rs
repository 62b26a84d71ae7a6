//! JSON wire types served to renderers.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::aggregate::{AggregatedView, DaySummary};
use crate::storage::LogRecord;

/// ISO-8601 UTC with millisecond precision (`2025-05-19T00:00:00.000Z`).
pub fn iso_millis(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/timezone`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneInfo {
    /// Zone used for every date computation.
    pub timezone: String,
    /// Today's local date key.
    pub formatted_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiProbeData {
    pub status: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApiLogEntry {
    /// Record time, ISO-8601 UTC.
    pub timestamp: String,
    pub data: ApiProbeData,
}

impl From<&LogRecord> for ApiLogEntry {
    fn from(record: &LogRecord) -> Self {
        Self {
            timestamp: iso_millis(record.recorded_at),
            data: ApiProbeData {
                status: record.probe.success,
                response_time_ms: record.probe.latency_ms,
                status_code: record.probe.status_code,
            },
        }
    }
}

/// `GET /api/logs`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogsResponse {
    pub timezone: String,
    /// Local date key to entries of that day, ascending by time.
    pub logs: BTreeMap<String, Vec<ApiLogEntry>>,
}

impl LogsResponse {
    pub fn new(timezone: impl Into<String>, view: &AggregatedView) -> Self {
        let logs = view
            .iter()
            .map(|(date, records)| {
                (
                    date.to_string(),
                    records.iter().map(ApiLogEntry::from).collect(),
                )
            })
            .collect();
        Self {
            timezone: timezone.into(),
            logs,
        }
    }
}

/// `GET /api/summary`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub timezone: String,
    pub today: String,
    /// Newest first.
    pub days: Vec<DaySummary>,
}

/// `GET /api/status`: the monitor's own health-check target.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl StatusResponse {
    pub fn ok(now: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: iso_millis(now),
            response_time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::storage::{Partition, ProbeResult};
    use crate::timezone::ZoneResolver;
    use chrono::TimeZone;

    fn partition() -> Partition {
        let at = |h, m| Utc.with_ymd_and_hms(2025, 5, 19, h, m, 0).unwrap();
        let record = |t: DateTime<Utc>, success, latency_ms| {
            LogRecord::new(
                t,
                "UTC",
                ProbeResult {
                    instant: t,
                    success,
                    latency_ms,
                    status_code: None,
                },
            )
        };
        Partition {
            name: "2025-05-19".to_string(),
            records: vec![record(at(15, 59), true, 12), record(at(16, 1), false, 5000)],
        }
    }

    #[test]
    fn test_logs_response_shape() {
        let zone = ZoneResolver::resolve("Asia/Kuala_Lumpur").unwrap();
        let view = aggregate(&[partition()], &zone);
        let value = serde_json::to_value(LogsResponse::new(zone.name(), &view)).unwrap();

        assert_eq!(value["timezone"], "Asia/Kuala_Lumpur");
        let day19 = value["logs"]["2025-05-19"].as_array().unwrap();
        let day20 = value["logs"]["2025-05-20"].as_array().unwrap();
        assert_eq!(day19.len(), 1);
        assert_eq!(day20.len(), 1);
        assert_eq!(day19[0]["timestamp"], "2025-05-19T15:59:00.000Z");
        assert_eq!(day19[0]["data"]["status"], true);
        assert_eq!(day19[0]["data"]["responseTimeMs"], 12);
        assert!(day19[0]["data"].get("statusCode").is_none());
        assert_eq!(day20[0]["data"]["status"], false);
    }

    #[test]
    fn test_logs_response_is_byte_identical_across_runs() {
        let zone = ZoneResolver::resolve("Asia/Kuala_Lumpur").unwrap();
        let partitions = [partition()];
        let a = serde_json::to_string(&LogsResponse::new(zone.name(), &aggregate(&partitions, &zone)))
            .unwrap();
        let b = serde_json::to_string(&LogsResponse::new(zone.name(), &aggregate(&partitions, &zone)))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_timezone_info_field_names() {
        let info = TimezoneInfo {
            timezone: "UTC".to_string(),
            formatted_date: "2025-05-19".to_string(),
        };
        let value = serde_json::to_value(info).unwrap();
        assert_eq!(value["formattedDate"], "2025-05-19");
    }
}
