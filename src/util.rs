use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::CrmError;
use crate::types::RecordId;

/// Current time as stamped onto writes.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// ISO 8601 with millisecond precision and a `Z` suffix (`2024-05-01T10:00:00.000Z`).
pub fn iso_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an identifier coming from a route or a form field.
///
/// Leading/trailing whitespace is ignored. Anything that is not a positive
/// integer is refused instead of being passed on to the store.
pub fn parse_record_id(raw: &str) -> Result<RecordId, CrmError> {
    parse_id_field("id", raw)
}

pub(crate) fn parse_id_field(field: &str, raw: &str) -> Result<RecordId, CrmError> {
    match raw.trim().parse::<RecordId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CrmError::TypeConversion {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Format a dollar amount the way the board and dashboard show it:
/// thousands separators, no cents unless there are any.
///
/// Example: 12500.0 → "$12,500", 99.5 → "$99.50"
pub fn format_currency(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if frac == 0 {
        format!("{}${}", sign, grouped)
    } else {
        format!("{}${}.{:02}", sign, grouped, frac)
    }
}

/// Whole-number percentage, e.g. 33.333 → "33%".
pub fn format_percentage(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}
