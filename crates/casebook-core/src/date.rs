//! Date recognition and conversion
//!
//! Dates take part in arithmetic through their numeric value: milliseconds since the Unix epoch,
//! interpreted as UTC. Strings are recognized as dates only when they follow one of the
//! supported layouts:
//!
//! - `YYYY-MM-DD`, optionally followed by `T` or a space and `HH:MM[:SS[.fff]]`, optionally `Z`
//! - `MM/DD/YYYY`

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_regex::regex_captures;

/// Largest magnitude a date's millisecond value may have (±100,000,000 days).
pub const MAX_MILLIS: f64 = 8.64e15;

/// Parse a date-formatted string.
///
/// Returns `None` when the text does not follow a supported layout or names a
/// non-existent calendar date.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some((_, year, month, day, hour, minute, second, fraction, _zone)) = regex_captures!(
        r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ](\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?)?(Z)?$",
        text
    ) {
        let date = NaiveDate::from_ymd_opt(
            year.parse().ok()?,
            month.parse().ok()?,
            day.parse().ok()?,
        )?;
        return date.and_hms_milli_opt(
            parse_or_zero(hour)?,
            parse_or_zero(minute)?,
            parse_or_zero(second)?,
            parse_fraction(fraction)?,
        );
    }

    if let Some((_, month, day, year)) = regex_captures!(r"^(\d{1,2})/(\d{1,2})/(\d{4})$", text) {
        let date = NaiveDate::from_ymd_opt(
            year.parse().ok()?,
            month.parse().ok()?,
            day.parse().ok()?,
        )?;
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

fn parse_or_zero(part: &str) -> Option<u32> {
    if part.is_empty() {
        Some(0)
    } else {
        part.parse().ok()
    }
}

/// `.5` means 500ms, `.05` means 50ms
fn parse_fraction(part: &str) -> Option<u32> {
    if part.is_empty() {
        return Some(0);
    }
    let padded = format!("{:0<3}", part);
    padded.parse().ok()
}

/// Numeric value of a date (milliseconds since the Unix epoch)
pub fn to_millis(date: &NaiveDateTime) -> f64 {
    date.and_utc().timestamp_millis() as f64
}

/// Construct a date from a millisecond value.
///
/// Fractional milliseconds are truncated. Returns `None` for non-finite or out-of-range values,
/// which callers treat as an invalid date.
pub fn from_millis(millis: f64) -> Option<NaiveDateTime> {
    if !millis.is_finite() || millis.abs() > MAX_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64).map(|dt| dt.naive_utc())
}

/// ISO-8601 rendering with millisecond precision, e.g. `2024-01-31T00:00:00.000Z`
pub fn format_iso(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
