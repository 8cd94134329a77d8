//! Helpers shared by the per-backend response normalizers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::types::UNKNOWN;

/// The value, or [`UNKNOWN`] when absent or blank.
pub fn or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// `"city, state, country"`, skipping absent parts.
pub fn location_string(city: Option<&str>, state: Option<&str>, country: Option<&str>) -> String {
    let parts: Vec<&str> = [city, state, country]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        UNKNOWN.to_string()
    } else {
        parts.join(", ")
    }
}

/// Render a location stored as a JSON document
/// (`{"city": .., "state": .., "country_code": ..}`). Anything that is not a
/// JSON object is assumed to be a preformatted string and returned as is.
pub fn location_from_json(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return UNKNOWN.to_string();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(location)) => {
            let field = |key: &str| location.get(key).and_then(Value::as_str);
            location_string(field("city"), field("state"), field("country_code"))
        }
        _ => raw.to_string(),
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
