//! Date arithmetic for cleaning schedules.
//!
//! All functions work at whole-day granularity. Time-of-day never enters the
//! comparison: inputs are calendar dates, and string inputs carrying a time
//! component are truncated to their date part before use.

use chrono::{DateTime, Local, NaiveDate};

/// Days-remaining threshold at which a drain counts as approaching its limit.
pub const APPROACHING_THRESHOLD_DAYS: i64 = 3;

/// Sentinel elapsed-days value for drains that were never cleaned. Far beyond
/// any realistic frequency, so such drains always classify as overdue.
pub const NEVER_CLEANED_DAYS: i64 = 999;

/// Today's calendar date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Absolute number of whole days between two calendar dates. Well-defined for
/// future dates too (days until, never negative).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days().abs()
}

/// Whole days elapsed between a cleaning date and `today`.
pub fn days_since(last_cleaning: NaiveDate, today: NaiveDate) -> i64 {
    days_between(last_cleaning, today)
}

/// True iff the elapsed days since `last_cleaning` exceed the frequency.
/// Exactly at the frequency is still on time.
pub fn is_overdue(last_cleaning: NaiveDate, frequency_days: u32, today: NaiveDate) -> bool {
    days_since(last_cleaning, today) > i64::from(frequency_days)
}

/// True iff the remaining days until the cleaning limit fall within
/// `[0, threshold]`. Overdue drains are never approaching.
pub fn is_approaching(
    last_cleaning: NaiveDate,
    frequency_days: u32,
    threshold: i64,
    today: NaiveDate,
) -> bool {
    let remaining = i64::from(frequency_days) - days_since(last_cleaning, today);
    remaining >= 0 && remaining <= threshold
}

/// Parses a calendar date from a wire string, truncating any time-of-day
/// component. Accepts `YYYY-MM-DD` and RFC 3339 timestamps.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
