//! Turns transport failures and HTTP responses into [`ClassifiedError`]s.
//!
//! Rules are applied in order and the first match wins:
//!
//! 1. transport failure mentioning a timeout: `Timeout`, retryable
//! 2. any other transport failure: `UpstreamError`, retryable
//! 3. HTTP 401: `Unauthorized`
//! 4. HTTP 404: `NotFound`
//! 5. HTTP 409: `Conflict`
//! 6. vendor error body (even on a 2xx): `UpstreamError`
//! 7. any other non-2xx: `UpstreamError`

use serde_json::Value;

use crate::error::{ClassifiedError, ErrorKind, Result};
use crate::redact::{self, MAX_LOGGED_STRING};
use crate::transport::{HttpResponse, TransportError};

pub fn is_timeout_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("timed out") || message.contains("timeout")
}

pub fn classify_transport(endpoint: &str, err: &TransportError) -> ClassifiedError {
    let classified = if is_timeout_message(&err.message) {
        ClassifiedError::new(ErrorKind::Timeout, "Provider API request timeout")
    } else {
        ClassifiedError::upstream("Provider API connection failed")
    };

    classified
        .retryable()
        .with_data("endpoint", endpoint)
        .with_debug("transport_error", err.message.as_str())
}

/// Classify a response that did arrive. `None` means the call succeeded.
pub fn classify_response(endpoint: &str, response: &HttpResponse) -> Option<ClassifiedError> {
    let parsed: Option<Value> = serde_json::from_str(&response.body).ok();
    let vendor = parsed.as_ref().and_then(VendorError::from_body);

    let status_rule = match response.status {
        401 => Some((ErrorKind::Unauthorized, "Provider API authentication error")),
        404 => Some((ErrorKind::NotFound, "Provider API resource not found")),
        409 => Some((ErrorKind::Conflict, "Provider API conflict")),
        _ => None,
    };

    let (kind, message) = match (status_rule, &vendor) {
        (Some((kind, base)), Some(vendor)) => (kind, format!("{base}: {}", vendor.detail())),
        (Some((kind, base)), None) => (kind, base.to_string()),
        (None, Some(vendor)) => (ErrorKind::UpstreamError, vendor.message()),
        (None, None) if !response.is_success() => (
            ErrorKind::UpstreamError,
            format!("API {} Error", response.status),
        ),
        (None, None) => return None,
    };

    Some(with_response_context(
        ClassifiedError::new(kind, message),
        endpoint,
        response,
        parsed,
    ))
}

/// Full classification of one remote call.
pub fn classify_outcome(
    endpoint: &str,
    outcome: std::result::Result<HttpResponse, TransportError>,
) -> Result<HttpResponse> {
    let response = outcome.map_err(|e| classify_transport(endpoint, &e))?;
    match classify_response(endpoint, &response) {
        Some(err) => Err(err),
        None => Ok(response),
    }
}

/// A successful response whose body could not be decoded.
pub fn malformed_response(
    endpoint: &str,
    response: &HttpResponse,
    err: &serde_json::Error,
) -> ClassifiedError {
    ClassifiedError::upstream("Unexpected provider API response")
        .with_data("endpoint", endpoint)
        .with_data("http_code", response.status)
        .with_debug("parse_error", err.to_string())
        .with_debug("response_body", redact::truncate(&response.body, MAX_LOGGED_STRING))
}

/// Attach the standard condensed response context to an error.
pub fn with_response_context(
    err: ClassifiedError,
    endpoint: &str,
    response: &HttpResponse,
    parsed: Option<Value>,
) -> ClassifiedError {
    let err = err
        .with_data("endpoint", endpoint)
        .with_data("http_code", response.status);

    match parsed {
        Some(body) if !is_empty(&body) => err.with_debug("response_data", redact::sanitize(body)),
        _ if response.body.is_empty() => err,
        _ => err.with_debug(
            "response_body",
            redact::truncate(&response.body, MAX_LOGGED_STRING),
        ),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Error fields vendors put in otherwise ordinary JSON bodies.
#[derive(Debug, Default, PartialEq)]
struct VendorError {
    title: Option<String>,
    heading: Option<String>,
    text: Option<String>,
    errors: Vec<String>,
}

impl VendorError {
    fn from_body(body: &Value) -> Option<Self> {
        let obj = body.as_object()?;

        let field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let heading = field("fatal_error_heading").or_else(|| field("error_heading"));
        let text = field("fatal_error_text");
        let errors = obj.get("error").map(error_list).unwrap_or_default();

        if heading.is_none() && text.is_none() && errors.is_empty() {
            return None;
        }

        Some(Self {
            title: field("title"),
            heading,
            text,
            errors,
        })
    }

    /// "API Error [title]: heading: text: e1, e2"
    fn message(&self) -> String {
        let mut message = String::from("API Error");
        if let Some(title) = &self.title {
            message.push_str(&format!(" [{title}]"));
        }
        message.push_str(": ");
        message.push_str(&self.detail());
        message
    }

    fn detail(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.heading.clone());
        parts.extend(self.text.clone());
        if !self.errors.is_empty() {
            parts.push(self.errors.join(", "));
        }
        parts.join(": ")
    }
}

fn error_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items.iter().flat_map(error_list).collect(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => vec![message.to_string()],
            _ => map.values().flat_map(error_list).collect(),
        },
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}
