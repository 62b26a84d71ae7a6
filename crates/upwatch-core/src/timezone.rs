//! Instant-to-calendar conversion for a configured IANA zone.
//!
//! All conversions go through the bundled tz database (`chrono-tz`), so DST
//! and historical offset changes are handled by the database rather than by
//! fixed-offset arithmetic. Unknown zone names are an error for the strict
//! functions; [`ZoneResolver::resolve_or_utc`] and [`date_key_or_utc`] apply
//! the deterministic UTC fallback and report that it happened.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Format of a local date key (`YYYY-MM-DD`, zero padded).
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Zone used when a configured name cannot be resolved.
pub const FALLBACK_ZONE: Tz = Tz::UTC;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimezoneError {
    /// The zone name is not present in the tz database.
    InvalidTimezone(String),
}

impl std::fmt::Display for TimezoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimezoneError::InvalidTimezone(name) => write!(f, "invalid timezone '{}'", name),
        }
    }
}

impl std::error::Error for TimezoneError {}

/// Local wall-clock fields of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl WallClock {
    fn from_local(local: &DateTime<Tz>) -> Self {
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
        }
    }

    /// Date part formatted as a local date key.
    pub fn date_key(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Parses an IANA zone name.
pub fn parse_zone(name: &str) -> Result<Tz, TimezoneError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimezoneError::InvalidTimezone(name.to_string()))
}

/// Returns the `YYYY-MM-DD` key of `instant` in `zone`.
pub fn local_date_key(instant: DateTime<Utc>, zone: &str) -> Result<String, TimezoneError> {
    let tz = parse_zone(zone)?;
    Ok(date_key_in(instant, tz))
}

/// Returns the local wall-clock fields of `instant` in `zone`.
pub fn local_wall_clock(instant: DateTime<Utc>, zone: &str) -> Result<WallClock, TimezoneError> {
    let tz = parse_zone(zone)?;
    Ok(WallClock::from_local(&instant.with_timezone(&tz)))
}

/// Like [`local_date_key`], but an unknown zone yields the UTC key together
/// with the error, so callers can surface the fallback.
pub fn date_key_or_utc(instant: DateTime<Utc>, zone: &str) -> (String, Option<TimezoneError>) {
    match parse_zone(zone) {
        Ok(tz) => (date_key_in(instant, tz), None),
        Err(e) => (date_key_in(instant, FALLBACK_ZONE), Some(e)),
    }
}

fn date_key_in(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format(DATE_KEY_FORMAT).to_string()
}

/// A zone resolved once from configuration and threaded into every caller.
///
/// Cheap to clone. Every date key in the process should come from the same
/// resolver so that two code paths never disagree about "today".
#[derive(Debug, Clone)]
pub struct ZoneResolver {
    tz: Tz,
    configured: String,
    fallback: Option<TimezoneError>,
}

impl ZoneResolver {
    /// Strict resolution: fails on an unknown zone name.
    pub fn resolve(name: &str) -> Result<Self, TimezoneError> {
        let tz = parse_zone(name)?;
        Ok(Self {
            tz,
            configured: name.to_string(),
            fallback: None,
        })
    }

    /// Resolves `name`, falling back to UTC when it is unknown.
    /// The fallback is logged and stays visible through [`Self::fallback`].
    pub fn resolve_or_utc(name: &str) -> Self {
        match Self::resolve(name) {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(
                    "{}; falling back to {} for all date computations",
                    e,
                    FALLBACK_ZONE.name()
                );
                Self {
                    tz: FALLBACK_ZONE,
                    configured: name.to_string(),
                    fallback: Some(e),
                }
            }
        }
    }

    pub fn utc() -> Self {
        Self {
            tz: Tz::UTC,
            configured: Tz::UTC.name().to_string(),
            fallback: None,
        }
    }

    /// Name of the zone actually used for conversions.
    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Name as it appeared in configuration.
    pub fn configured_name(&self) -> &str {
        &self.configured
    }

    /// The resolution error, when the UTC fallback is in effect.
    pub fn fallback(&self) -> Option<&TimezoneError> {
        self.fallback.as_ref()
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn date_key(&self, instant: DateTime<Utc>) -> String {
        date_key_in(instant, self.tz)
    }

    pub fn wall_clock(&self, instant: DateTime<Utc>) -> WallClock {
        WallClock::from_local(&instant.with_timezone(&self.tz))
    }

    /// Today's date key.
    pub fn today(&self) -> String {
        self.date_key(Utc::now())
    }
}
