use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use vb_core::{ClassifiedError, ErrorKind};
use vb_infra::ProviderName;
use vb_infra::types::InstanceId;

use crate::auth::RequestId;
use crate::dto::{ErrorBody, ErrorResponse};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("provider not available: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    Provider(ClassifiedError),
}

/// Where a provider failure happened, merged into the error before it is
/// returned.
pub struct CallContext<'a> {
    pub request_id: RequestId,
    pub provider: ProviderName,
    pub operation: &'static str,
    pub instance_id: Option<&'a InstanceId>,
}

impl CallContext<'_> {
    pub fn fail(&self, err: ClassifiedError) -> ApiError {
        let mut data = Map::new();
        data.insert("request_id".into(), self.request_id.0.to_string().into());
        data.insert("provider".into(), self.provider.as_str().into());
        data.insert("operation".into(), self.operation.into());
        if let Some(id) = self.instance_id {
            data.insert("instance_id".into(), id.as_str().into());
        }
        let err = err.merge_context(data, Map::new());

        let details = Value::Object(err.debug().clone());
        match err.kind() {
            ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::Unsupported
            | ErrorKind::ValidationFailed => tracing::warn!(
                request_id = %self.request_id.0,
                provider = %self.provider,
                operation = self.operation,
                kind = %err.kind(),
                details = %details,
                "{}",
                err.message()
            ),
            _ => tracing::error!(
                request_id = %self.request_id.0,
                provider = %self.provider,
                operation = self.operation,
                kind = %err.kind(),
                retryable = err.is_retryable(),
                details = %details,
                "{}",
                err.message()
            ),
        }

        ApiError::Provider(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        // The backend rejected our credentials, not the caller's.
        ErrorKind::Unauthorized => StatusCode::BAD_GATEWAY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    kind: "unauthorized".into(),
                    message: "missing or invalid API key".into(),
                    data: Map::new(),
                    retryable: false,
                },
            ),
            ApiError::UnknownProvider(name) => {
                let mut data = Map::new();
                data.insert("provider".into(), name.into());
                (
                    StatusCode::NOT_FOUND,
                    ErrorBody {
                        kind: "unknown_provider".into(),
                        message: "Provider not available".into(),
                        data,
                        retryable: false,
                    },
                )
            }
            // `debug` stays in the logs.
            ApiError::Provider(err) => (
                status_for(err.kind()),
                ErrorBody {
                    kind: err.kind().as_str().into(),
                    message: err.message().into(),
                    data: err.data().clone(),
                    retryable: err.is_retryable(),
                },
            ),
        };

        (status, Json(ErrorResponse { error: body })).into_response()
    }
}
