//! Regrouping of loaded partitions into local calendar days.
//!
//! Records are bucketed by the local date of their own `recorded_at` under
//! the zone passed in (the currently configured one), never by the partition
//! they were read from and never by their stored `timezone_label`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::storage::{LogRecord, Partition};
use crate::timezone::ZoneResolver;

/// Uptime at or above this is operational.
pub const OPERATIONAL_THRESHOLD: f64 = 99.9;
/// Uptime at or above this (and below operational) is degraded.
pub const DEGRADED_THRESHOLD: f64 = 90.0;

/// Date key to records of that local day, ascending by `recorded_at`.
/// Keys are unique and every value is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedView {
    days: BTreeMap<String, Vec<LogRecord>>,
}

impl AggregatedView {
    pub fn get(&self, date: &str) -> Option<&[LogRecord]> {
        self.days.get(date).map(Vec::as_slice)
    }

    /// Date keys in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.days.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &[LogRecord])> {
        self.days.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of days.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

/// Flattens all partitions and regroups their records by local date in `zone`.
pub fn aggregate(partitions: &[Partition], zone: &ZoneResolver) -> AggregatedView {
    let mut days: BTreeMap<String, Vec<LogRecord>> = BTreeMap::new();

    for record in partitions.iter().flat_map(|p| p.records.iter()) {
        days.entry(zone.date_key(record.recorded_at))
            .or_default()
            .push(record.clone());
    }

    // Stable: equal timestamps keep their load order.
    for records in days.values_mut() {
        records.sort_by_key(|r| r.recorded_at);
    }

    AggregatedView { days }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Operational,
    Degraded,
    Down,
}

impl StatusLevel {
    pub fn from_uptime(percent: f64) -> Self {
        if percent >= OPERATIONAL_THRESHOLD {
            StatusLevel::Operational
        } else if percent >= DEGRADED_THRESHOLD {
            StatusLevel::Degraded
        } else {
            StatusLevel::Down
        }
    }
}

/// Probes that fell into one local hour of a day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct HourSlot {
    pub hour: u32,
    pub scans: u32,
    pub up: u32,
    /// Status of the latest probe in the hour.
    pub last_status: Option<bool>,
    pub avg_response_ms: Option<f64>,
}

/// Figures for one local day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: String,
    pub up: u32,
    pub down: u32,
    pub total: u32,
    pub uptime_percent: f64,
    pub avg_response_ms: f64,
    pub level: StatusLevel,
    /// Always 24 slots, hour 0 first.
    pub hours: Vec<HourSlot>,
}

impl DaySummary {
    /// `records` must be ascending by time (as in an [`AggregatedView`]).
    pub fn from_records(date: &str, records: &[LogRecord], zone: &ZoneResolver) -> Self {
        let mut hours: Vec<HourSlot> = (0..24)
            .map(|hour| HourSlot {
                hour,
                scans: 0,
                up: 0,
                last_status: None,
                avg_response_ms: None,
            })
            .collect();
        let mut hour_latency = [0u64; 24];

        let mut up = 0u32;
        let mut latency_total = 0u64;
        for record in records {
            let success = record.probe.success;
            if success {
                up += 1;
            }
            latency_total += record.probe.latency_ms;

            let hour = zone.wall_clock(record.recorded_at).hour as usize;
            let slot = &mut hours[hour];
            slot.scans += 1;
            if success {
                slot.up += 1;
            }
            slot.last_status = Some(success);
            hour_latency[hour] += record.probe.latency_ms;
        }

        for (slot, total) in hours.iter_mut().zip(hour_latency) {
            if slot.scans > 0 {
                slot.avg_response_ms = Some(total as f64 / slot.scans as f64);
            }
        }

        let total = records.len() as u32;
        let (uptime_percent, avg_response_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                up as f64 / total as f64 * 100.0,
                latency_total as f64 / total as f64,
            )
        };

        Self {
            date: date.to_string(),
            up,
            down: total - up,
            total,
            uptime_percent,
            avg_response_ms,
            level: StatusLevel::from_uptime(uptime_percent),
            hours,
        }
    }
}

/// Summaries for every day of `view`, newest first.
pub fn summarize(view: &AggregatedView, zone: &ZoneResolver) -> Vec<DaySummary> {
    view.iter()
        .rev()
        .map(|(date, records)| DaySummary::from_records(date, records, zone))
        .collect()
}
