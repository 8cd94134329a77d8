use serde::Serialize;
use serde_json::{Map, Value};
use vb_infra::ProviderName;

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderName>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub retryable: bool,
}
