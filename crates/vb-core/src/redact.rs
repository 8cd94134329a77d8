//! Bounding and masking of vendor payloads before they are logged or attached
//! to an error.

use serde_json::{Map, Value};

/// Top-level collections that vendors return in bulk (catalog listings, every
/// VPS on a node, ...). With more than one entry they are replaced by a summary.
pub const CONDENSED_COLLECTIONS: &[&str] = &[
    "vs",
    "vpses",
    "ostemplates",
    "scripts",
    "plans",
    "servers",
    "servs",
    "servergroups",
    "users",
    "ips",
    "regions",
    "os",
    "public_isos",
    "instances",
];

pub const REDACTED: &str = "[Redacted]";

/// Strings longer than this are masked regardless of their key.
pub const MAX_LOGGED_STRING: usize = 500;

/// Account-level fields some vendors echo back on every call.
const SENSITIVE_KEYS: &[&str] = &[
    "customheader",
    "passwordresetemail",
    "bannerurl",
    "billingdue",
    "passwordreset",
    "rootpass",
    "user_pass",
    "newpass",
    "conf",
    "adminapikey",
    "adminapipass",
    "apikey",
    "api_key",
    "token_key",
];

/// Replace bulky top-level collections with `"[redacted N items]"`.
pub fn condense(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    for key in CONDENSED_COLLECTIONS {
        let count = match map.get(*key) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(items)) => items.len(),
            _ => continue,
        };
        if count > 1 {
            map.insert((*key).to_string(), Value::String(format!("[redacted {count} items]")));
        }
    }

    Value::Object(map)
}

/// Mask sensitive or oversized string fields, recursively.
///
/// A field named exactly `error` is never masked.
pub fn redact(value: Value) -> Value {
    redact_field(value, None)
}

/// [`condense`] then [`redact`]: the form in which payloads leave this crate.
pub fn sanitize(value: Value) -> Value {
    redact(condense(value))
}

/// Sanitize a flat list of request parameters.
pub fn sanitize_params(params: &[(String, String)]) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    redact(Value::Object(map))
}

/// Cut a raw body down to `max` characters for attaching to an error.
pub fn truncate(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(max).collect();
    cut.push_str("...");
    cut
}

fn redact_field(value: Value, key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = redact_field(v, Some(&k));
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| redact_field(v, None)).collect())
        }
        Value::String(s) if should_redact(key, &s) => Value::String(REDACTED.into()),
        other => other,
    }
}

fn should_redact(key: Option<&str>, value: &str) -> bool {
    if key == Some("error") {
        return false;
    }
    if value.chars().count() > MAX_LOGGED_STRING {
        return true;
    }
    let Some(key) = key else {
        return false;
    };
    let key = key.to_ascii_lowercase();
    key.contains("password")
        || SENSITIVE_KEYS.contains(&key.as_str())
        || key.ends_with("html")
        || key.ends_with("css")
        || key.ends_with("emailcontent")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn masks_passwords_and_markup() {
        let out = redact(json!({
            "hostname": "web1.example.com",
            "password": "hunter2",
            "SuperPassword": "s3cret",
            "welcomeEmailContent": "<p>hi</p>",
            "headerHtml": "<b>x</b>",
            "siteCss": "body{}",
            "rootpass": "abc",
        }));

        assert_eq!(out["hostname"], json!("web1.example.com"));
        for key in ["password", "SuperPassword", "welcomeEmailContent", "headerHtml", "siteCss", "rootpass"] {
            assert_eq!(out[key], json!(REDACTED), "{key} should be masked");
        }
    }

    #[test]
    fn masks_long_strings_but_never_error() {
        let long = "x".repeat(MAX_LOGGED_STRING + 1);
        let out = redact(json!({
            "notes": long.clone(),
            "error": long.clone(),
            "nested": { "blob": long.clone() },
        }));

        assert_eq!(out["notes"], json!(REDACTED));
        assert_eq!(out["nested"]["blob"], json!(REDACTED));
        assert_eq!(out["error"], json!(long));
    }

    #[test]
    fn exactly_threshold_is_kept() {
        let edge = "y".repeat(MAX_LOGGED_STRING);
        let out = redact(json!({ "notes": edge.clone() }));
        assert_eq!(out["notes"], json!(edge));
    }

    #[test]
    fn condenses_bulky_collections() {
        let out = condense(json!({
            "plans": { "1": {"plid": 1}, "2": {"plid": 2}, "3": {"plid": 3} },
            "servers": [{"serid": 0}],
            "ips": ["10.0.0.1", "10.0.0.2"],
            "done": 1,
        }));

        assert_eq!(out["plans"], json!("[redacted 3 items]"));
        assert_eq!(out["ips"], json!("[redacted 2 items]"));
        // single entries stay readable
        assert_eq!(out["servers"], json!([{"serid": 0}]));
        assert_eq!(out["done"], json!(1));
    }

    #[test]
    fn truncates_raw_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 4), "abcd...");
    }
}
