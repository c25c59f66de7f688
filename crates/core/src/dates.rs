//! Calendar-day helpers. All dates are UTC calendar days.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{Error, Result};

/// Maximum number of calendar days covered by one task window.
pub const WINDOW_DAYS: i64 = 100;

/// Wire and storage format for calendar days.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of the processing horizon ("yesterday").
///
/// Production uses the wall clock; tests pin the horizon to a fixed day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Horizon {
    #[default]
    System,
    Fixed(NaiveDate),
}

impl Horizon {
    /// The last complete UTC day.
    pub fn yesterday(&self) -> NaiveDate {
        match self {
            Self::System => yesterday_utc(),
            Self::Fixed(day) => *day,
        }
    }
}

/// The UTC day before today.
pub fn yesterday_utc() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| Error::config(format!("bad date {:?}: {}", s, e)))
}

/// Truncate a millisecond timestamp to its UTC calendar day.
pub fn day_of_millis(ms: i64) -> Option<(NaiveDate, DateTime<Utc>)> {
    let ts = DateTime::<Utc>::from_timestamp_millis(ms)?;
    Some((ts.date_naive(), ts))
}

/// Every day in `[from, to]`, ascending. Empty when `to < from`.
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if to < from {
        return Vec::new();
    }
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Number of days in `[from, to]`, zero when `to < from`.
pub fn span_days(from: NaiveDate, to: NaiveDate) -> i64 {
    ((to - from).num_days() + 1).max(0)
}
