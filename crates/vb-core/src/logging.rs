use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::redact;
use crate::transport::{Body, HttpRequest, HttpResponse, Transport, TransportError};

/// Emits one structured `tracing` event per request/response pair.
///
/// Parameters and results pass through [`redact`] first, so credentials and
/// bulky catalog payloads never reach the log sink.
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
    provider: &'static str,
}

impl LoggingTransport {
    pub fn new(inner: Arc<dyn Transport>, provider: &'static str) -> Self {
        Self { inner, provider }
    }
}

/// Wrap `inner` in a [`LoggingTransport`] when `enabled`.
pub fn with_logging(
    inner: Arc<dyn Transport>,
    provider: &'static str,
    enabled: bool,
) -> Arc<dyn Transport> {
    if enabled {
        Arc::new(LoggingTransport::new(inner, provider))
    } else {
        inner
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method.as_str();
        let url = request.url.clone();
        let params = request_params(&request);

        let outcome = self.inner.send(request).await;

        match &outcome {
            Ok(response) => {
                let result = response
                    .json::<Value>()
                    .map(redact::sanitize)
                    .unwrap_or_else(|_| {
                        Value::String(redact::truncate(&response.body, redact::MAX_LOGGED_STRING))
                    });
                let status = if response.is_success() { "OK" } else { "ERROR" };
                tracing::debug!(
                    provider = self.provider,
                    method,
                    url = %url,
                    http_code = response.status,
                    params = %params,
                    result = %result,
                    "provider request {status}"
                );
            }
            Err(e) => {
                tracing::debug!(
                    provider = self.provider,
                    method,
                    url = %url,
                    params = %params,
                    error = %e,
                    "provider request ERROR"
                );
            }
        }

        outcome
    }
}

fn request_params(request: &HttpRequest) -> Value {
    let mut params = match redact::sanitize_params(&request.query) {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let body = match &request.body {
        Body::Empty => Value::Null,
        Body::Json(body) => redact::sanitize(body.clone()),
        Body::Form(fields) => redact::sanitize_params(fields),
    };
    match body {
        Value::Object(fields) => params.extend(fields),
        Value::Null => {}
        other => {
            params.insert("body".into(), other);
        }
    }

    Value::Object(params)
}
