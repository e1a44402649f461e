//! Query time windows
//!
//! Resolves a look-back in days (or explicit bounds) into an absolute
//! `[start, end)` UTC window. The clock is injected so windows are
//! reproducible in tests.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::InvalidParameter;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests and replays
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Half-open `[start, end)` UTC window, always `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Window parameters as supplied by a tool call
#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    pub days: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl WindowSpec {
    pub fn days(days: f64) -> Self {
        Self {
            days,
            start: None,
            end: None,
        }
    }

    pub fn with_bounds(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Resolve a window spec against the clock.
///
/// `days` must be finite and positive even when explicit bounds are given.
/// With both bounds, they are used verbatim; with only `start`, the window
/// ends now; with only `end`, it reaches `days` back from `end`.
pub fn resolve_window(spec: &WindowSpec, clock: &dyn Clock) -> Result<QueryWindow, InvalidParameter> {
    let lookback = days_to_duration(spec.days)?;

    let (start, end) = match (spec.start, spec.end) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, clock.now()),
        (None, end) => {
            let end = end.unwrap_or_else(|| clock.now());
            let start = end.checked_sub_signed(lookback).ok_or_else(|| {
                InvalidParameter::new("days", format!("look-back of {} days is out of range", spec.days))
            })?;
            (start, end)
        }
    };

    if start >= end {
        return Err(InvalidParameter::new(
            "start_time",
            format!("window start {} must be before end {}", start, end),
        ));
    }

    Ok(QueryWindow { start, end })
}

fn days_to_duration(days: f64) -> Result<Duration, InvalidParameter> {
    if !days.is_finite() || days <= 0.0 {
        return Err(InvalidParameter::new(
            "days",
            format!("must be a positive number, got {}", days),
        ));
    }
    let millis = (days * MS_PER_DAY).round();
    // Beyond chrono's representable range
    if millis > i64::MAX as f64 / 2.0 {
        return Err(InvalidParameter::new(
            "days",
            format!("look-back of {} days is out of range", days),
        ));
    }
    Ok(Duration::milliseconds(millis as i64))
}

/// Parse an optional ISO-8601 bound from tool input
pub fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, InvalidParameter> {
    let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| InvalidParameter::new(name, format!("not an ISO-8601 timestamp ({}): {}", e, raw)))
}
