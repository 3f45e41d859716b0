//! Readers for raw store records.
//!
//! The store keeps domain fields under suffixed keys (`email_c`) while older
//! payloads and hand-written fixtures use bare names (`email`). Each reader
//! takes the candidate keys in priority order and returns the first usable
//! value, so fallback chains stay at this boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::error::CrmError;
use crate::types::RecordId;

// Field names as persisted by the store.
pub const ID: &str = "Id";
pub const NAME: &str = "Name";
pub const EMAIL: &str = "email_c";
pub const COMPANY: &str = "company_c";
pub const PHONE: &str = "phone_c";
pub const NOTES: &str = "notes_c";
pub const TITLE: &str = "title_c";
pub const VALUE: &str = "value_c";
pub const STAGE: &str = "stage_c";
pub const PROBABILITY: &str = "probability_c";
pub const EXPECTED_CLOSE_DATE: &str = "expected_close_date_c";
pub const CONTACT_ID: &str = "contact_id_c";
pub const TYPE: &str = "type_c";
pub const DESCRIPTION: &str = "description_c";
pub const TIMESTAMP: &str = "timestamp_c";
pub const CREATED_AT: &str = "created_at_c";
pub const UPDATED_AT: &str = "updated_at_c";

/// First present, non-null value among `keys`.
fn pick<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

/// Text field; numbers are rendered, missing fields read as empty.
pub fn text(record: &Value, keys: &[&str]) -> String {
    optional_text(record, keys).unwrap_or_default()
}

/// Text field that may be absent. Blank strings count as absent.
pub fn optional_text(record: &Value, keys: &[&str]) -> Option<String> {
    match pick(record, keys)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Floating point field. Numeric strings are parsed; anything else,
/// including `NaN` and infinities, is 0.
pub fn number(record: &Value, keys: &[&str]) -> f64 {
    let parsed = match pick(record, keys) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Identifier field. Accepts a number, a numeric string, or a lookup object
/// carrying `Id`.
pub fn record_id(record: &Value, keys: &[&str]) -> Option<RecordId> {
    match pick(record, keys)? {
        Value::Object(obj) => obj.get(ID).or_else(|| obj.get("id")).and_then(scalar_id),
        other => scalar_id(other),
    }
}

fn scalar_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as RecordId)),
        Value::String(s) => s.trim().parse::<RecordId>().ok(),
        _ => None,
    }
}

/// Like [`record_id`] but the field must be present.
pub fn required_id(record: &Value, keys: &[&str]) -> Result<RecordId, CrmError> {
    record_id(record, keys).ok_or_else(|| {
        CrmError::Decode(format!("record has no usable {}", keys.first().copied().unwrap_or(ID)))
    })
}

/// RFC 3339 timestamp; missing or malformed values read as the Unix epoch
/// so that such records sort last.
pub fn timestamp(record: &Value, keys: &[&str]) -> DateTime<Utc> {
    optional_text(record, keys)
        .and_then(|s| parse_timestamp(&s))
        .unwrap_or_default()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Calendar date (`YYYY-MM-DD`), also accepting a full timestamp.
pub fn date(record: &Value, keys: &[&str]) -> Option<NaiveDate> {
    let raw = optional_text(record, keys)?;
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

/// Build the projection list for a query.
pub fn projection<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(keys.len() + 1);
    out.push(ID);
    out.extend(keys.iter().copied().filter(|k| *k != ID));
    out
}
