//! Date normalization.
//!
//! The stored data carries three representations of the same logical concept:
//! epoch-millisecond timestamps, `YYYY-MM-DD` strings (sometimes with a time
//! suffix, sometimes non-padded), and `MM/DD/YYYY` strings. Everything is
//! unified here into the canonical padded `YYYY-MM-DD` day key at every
//! ingestion boundary; no other module parses dates.
//!
//! Unparseable input yields an empty string, which sorts and groups before
//! any valid day.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Normalize a JSON date value (timestamp, ISO string, or `MM/DD/YYYY`)
/// to a canonical `YYYY-MM-DD` key. Returns `""` when unparseable.
pub fn normalize_date(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(day_from_timestamp)
            .map(day_key)
            .unwrap_or_default(),
        Value::String(s) => normalize_date_str(s),
        _ => String::new(),
    }
}

/// Normalize a date string to the canonical key. Returns `""` when unparseable.
pub fn normalize_date_str(raw: &str) -> String {
    parse_flexible(raw).map(day_key).unwrap_or_default()
}

/// Parse either `YYYY-MM-DD[T...]` (padded or not) or `MM/DD/YYYY`.
pub fn parse_flexible(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Strip any time suffix first
    let date_part = trimmed
        .split(|c| c == 'T' || c == ' ')
        .next()
        .unwrap_or(trimmed);

    if date_part.contains('/') {
        let parts: Vec<&str> = date_part.split('/').collect();
        if parts.len() != 3 {
            return None;
        }
        let month: u32 = parts[0].parse().ok()?;
        let day: u32 = parts[1].parse().ok()?;
        let year: i32 = parts[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Calendar day for an epoch timestamp. Accepts milliseconds (the stored
/// form) and falls back to seconds for small magnitudes.
fn day_from_timestamp(ts: i64) -> Option<NaiveDate> {
    let millis = if ts.abs() < 100_000_000_000 {
        ts.checked_mul(1000)?
    } else {
        ts
    };
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Canonical padded day key: `YYYY-MM-DD`.
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Parse a canonical (or non-padded) `-`-separated day key.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    parse_flexible(key)
}

/// Legacy summary-document key: `{year}-{month}-{day}` with no zero padding,
/// e.g. `2025-3-2`. The daily-report form has always written this shape.
pub fn summary_key(day: NaiveDate) -> String {
    format!("{}-{}-{}", day.year(), day.month(), day.day())
}

/// Midday-UTC instant for a day key. Constructing timestamps at midday means
/// converting back to a calendar day can never shift the day, whatever
/// timezone the reader applies within UTC±12.
pub fn midday_utc(day: NaiveDate) -> DateTime<Utc> {
    let noon = day.and_hms_opt(12, 0, 0).unwrap_or(NaiveDateTime::MIN);
    Utc.from_utc_datetime(&noon)
}

/// First and last day of a calendar month.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// All days from `from` through `to`, inclusive, ascending.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = from;
    while day <= to {
        days.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

// ===========================================================================
// Tests
// ===========================================================================
