use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Domain error taxonomy shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Conflict,
    Timeout,
    Unsupported,
    ValidationFailed,
    UpstreamError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::Unsupported => "unsupported",
            Self::ValidationFailed => "validation_failed",
            Self::UpstreamError => "upstream_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure classified once, at the point closest to its origin.
///
/// `data` is safe to show to end users and to log. `debug` holds verbose vendor
/// payloads (already condensed and redacted) meant for operators only.
///
/// Once built, the only permitted change is [`ClassifiedError::merge_context`],
/// which adds keys but never replaces the kind, message or existing context.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    data: Map<String, Value>,
    debug: Map<String, Value>,
    retryable: bool,
}

pub type Result<T> = std::result::Result<T, ClassifiedError>;

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: Map::new(),
            debug: Map::new(),
            retryable: false,
        }
    }

    /// The operation is not offered by the backend. Raised before any remote call.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(ErrorKind::Unsupported, "Operation not supported")
            .with_data("operation", operation)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamError, message)
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_debug(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.debug.insert(key.into(), value.into());
        self
    }

    pub(crate) fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Enrich an already classified error with context from an outer layer.
    ///
    /// Keys already present are kept: the context recorded at the origin wins.
    pub fn merge_context(mut self, data: Map<String, Value>, debug: Map<String, Value>) -> Self {
        for (key, value) in data {
            self.data.entry(key).or_insert(value);
        }
        for (key, value) in debug {
            self.debug.entry(key).or_insert(value);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn debug(&self) -> &Map<String, Value> {
        &self.debug
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_keeps_origin_context() {
        let err = ClassifiedError::not_found("Virtual server not found")
            .with_data("vpsid", "42")
            .with_debug("response_data", json!({"vps": []}));

        let mut outer_data = Map::new();
        outer_data.insert("vpsid".into(), json!("overwritten?"));
        outer_data.insert("request_id".into(), json!("req-1"));
        let mut outer_debug = Map::new();
        outer_debug.insert("provider".into(), json!("virtualizor"));

        let merged = err.merge_context(outer_data, outer_debug);

        assert_eq!(merged.kind(), ErrorKind::NotFound);
        assert_eq!(merged.message(), "Virtual server not found");
        assert_eq!(merged.data()["vpsid"], json!("42"));
        assert_eq!(merged.data()["request_id"], json!("req-1"));
        assert_eq!(merged.debug()["provider"], json!("virtualizor"));
        assert!(merged.debug().contains_key("response_data"));
    }

    #[test]
    fn unsupported_is_terminal() {
        let err = ClassifiedError::unsupported("resize");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(!err.is_retryable());
        assert_eq!(err.data()["operation"], json!("resize"));
        assert_eq!(err.to_string(), "Operation not supported");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let raw = serde_json::to_string(&ErrorKind::ValidationFailed).unwrap();
        assert_eq!(raw, "\"validation_failed\"");
    }
}
