use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::warn;

use super::models::Day;

/// Weekday for a full English day name. Matching is case-sensitive.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name {
        "Sunday" => Some(Weekday::Sun),
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        _ => None,
    }
}

/// Dates on which `day` occurs inside `range` (inclusive), ascending and distinct.
///
/// A pinned date wins over the weekday set and is not clamped. Unknown weekday
/// tokens are skipped; a missing or inverted range yields nothing.
pub fn expand_day(day: &Day, range: Option<(NaiveDate, NaiveDate)>) -> Vec<NaiveDate> {
    if let Some(date) = day.date {
        return vec![date];
    }

    let weekdays: HashSet<Weekday> = day
        .day_of_week
        .iter()
        .filter_map(|token| {
            let parsed = parse_weekday(token);
            if parsed.is_none() {
                warn!(target: "engine.expand", day_id = %day.id, token = %token, "ignoring unknown weekday");
            }
            parsed
        })
        .collect();
    if weekdays.is_empty() {
        return Vec::new();
    }

    let Some((start, end)) = range else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| weekdays.contains(&date.weekday()))
        .collect()
}

/// Parses `YYYY-MM-DD`, or keeps the date part of an RFC 3339 instant.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(instant) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(instant.date_naive());
    }
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}
