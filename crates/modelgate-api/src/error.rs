//! API error types and handling

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use modelgate_common::{InvalidModelId, ModelId};
use modelgate_local_models::StoreError;
use modelgate_pool::{BackendError, PoolError};
use serde_json::json;
use thiserror::Error;

/// Seconds a client is told to wait after a pool exhaustion
const RETRY_AFTER_SECS: u64 = 1;

/// Failure of one completion request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The model could not be downloaded
    #[error("Model {model} is unavailable: download failed: {cause}")]
    DownloadFailed {
        /// Requested model
        model: ModelId,
        /// Downloader error
        cause: String,
    },

    /// The model could not be loaded into memory
    #[error("Model {model} is unavailable: load failed: {cause}")]
    LoadFailed {
        /// Requested model
        model: ModelId,
        /// Loader error
        cause: String,
    },

    /// No instance became free within the checkout timeout
    #[error("No instance of {model} available, retry later")]
    PoolExhausted {
        /// Requested model
        model: ModelId,
    },

    /// The instance failed to generate a reply
    #[error("Inference failed for {model}: {cause}")]
    InferenceFailed {
        /// Requested model
        model: ModelId,
        /// Backend error
        cause: String,
    },

    /// The request body is missing, unparsable or invalid
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

impl ApiError {
    /// Machine-readable kind reported in the error body
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::DownloadFailed { .. } => "download_failed",
            ApiError::LoadFailed { .. } => "load_failed",
            ApiError::PoolExhausted { .. } => "pool_exhausted",
            ApiError::InferenceFailed { .. } => "inference_failed",
            ApiError::MalformedRequest(_) => "malformed_request",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DownloadFailed { .. } | ApiError::LoadFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::PoolExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InferenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DownloadFailed { model, cause } => {
                ApiError::DownloadFailed { model, cause }
            }
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { model, .. } => ApiError::PoolExhausted { model },
            PoolError::LoadFailed { model, cause } => ApiError::LoadFailed { model, cause },
        }
    }
}

impl From<InvalidModelId> for ApiError {
    fn from(err: InvalidModelId) -> Self {
        ApiError::MalformedRequest(format!("invalid model identifier: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised while building or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] modelgate_config::ConfigError),

    /// The configured default model is not a valid identifier
    #[error("Invalid default model: {0}")]
    InvalidModel(#[from] InvalidModelId),

    /// A download backend could not be built
    #[error("Download backend error: {0}")]
    Download(#[from] modelgate_local_models::DownloadError),

    /// An inference backend could not be built
    #[error("Inference backend error: {0}")]
    Backend(#[from] BackendError),

    /// Binding or serving failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelId {
        ModelId::parse("phi-2").unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::DownloadFailed {
                    model: model(),
                    cause: "x".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "download_failed",
            ),
            (
                ApiError::LoadFailed {
                    model: model(),
                    cause: "x".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "load_failed",
            ),
            (
                ApiError::PoolExhausted { model: model() },
                StatusCode::TOO_MANY_REQUESTS,
                "pool_exhausted",
            ),
            (
                ApiError::InferenceFailed {
                    model: model(),
                    cause: "x".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "inference_failed",
            ),
            (
                ApiError::MalformedRequest("x".into()),
                StatusCode::BAD_REQUEST,
                "malformed_request",
            ),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn test_pool_errors_convert() {
        let exhausted: ApiError = PoolError::Exhausted {
            model: model(),
            capacity: 1,
        }
        .into();
        assert_eq!(exhausted, ApiError::PoolExhausted { model: model() });

        let failed: ApiError = PoolError::LoadFailed {
            model: model(),
            cause: "oom".into(),
        }
        .into();
        assert!(failed.to_string().contains("oom"));
        assert!(failed.to_string().contains("phi-2"));
    }

    #[test]
    fn test_exhaustion_sets_retry_after() {
        let response = ApiError::PoolExhausted { model: model() }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
