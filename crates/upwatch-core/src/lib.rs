//! upwatch-core: collector and aggregator for the upwatch uptime monitor.
//!
//! Provides:
//! - `probe`: single-shot HTTP probe with a hard time bound
//! - `timezone`: tz-database backed local dates and wall-clock fields
//! - `storage`: append-only, date-partitioned JSON log store
//! - `collector`: periodic, non-overlapping probing loop
//! - `aggregate`: regrouping of loaded records by local date, day summaries
//!
//! With `api` feature (default):
//! - `api`: JSON wire types for the read endpoints

pub mod aggregate;
pub mod collector;
pub mod probe;
pub mod storage;
pub mod timezone;

#[cfg(feature = "api")]
pub mod api;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
