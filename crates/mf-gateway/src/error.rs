//! Error types for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mf_ingest::{BackendError, BulkItemFailure, IngestError};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request body could not be understood.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The ingestion pipeline failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// The storage backend could not be set up.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'static str>,
    #[serde(skip_serializing_if = "no_failures")]
    failures: &'a [BulkItemFailure],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_failures(failures: &&[BulkItemFailure]) -> bool {
    failures.is_empty()
}

impl GatewayError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRequest(_) | Self::Ingest(IngestError::InvalidSample { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            Self::Ingest(IngestError::BackendUnavailable { .. })
            | Self::Backend(BackendError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
            Self::Ingest(IngestError::BulkItemsFailed { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "bulk_items_failed")
            }
            Self::Ingest(_) => (StatusCode::INTERNAL_SERVER_ERROR, "write_failed"),
            Self::BindFailed(_, _) | Self::Config(_) | Self::Backend(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();

        let (step, failures) = match &self {
            Self::Ingest(err) => (
                err.step().map(|s| s.as_str()),
                match err {
                    IngestError::BulkItemsFailed { failures } => failures.as_slice(),
                    _ => &[][..],
                },
            ),
            _ => (None, &[][..]),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, step = step.unwrap_or("-"), "request failed");
        }

        let body = ErrorResponse {
            error: error_type,
            message: self.to_string(),
            step,
            failures,
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use mf_ingest::PipelineStep;

    async fn body_json(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_request_error_response() {
        let (status, json) = body_json(GatewayError::InvalidRequest("bad json".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_request");
        assert!(json.get("failures").is_none());
    }

    #[tokio::test]
    async fn test_invalid_sample_is_bad_request() {
        let err = GatewayError::from(IngestError::InvalidSample {
            index: Some(2),
            reason: "missing WorkflowID".to_string(),
        });
        let (status, json) = body_json(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["step"], "decode");
        assert!(json["message"].as_str().unwrap().contains("#2"));
    }

    #[tokio::test]
    async fn test_backend_unavailable_response() {
        let err = GatewayError::from(IngestError::BackendUnavailable {
            step: PipelineStep::Write,
            reason: "connection refused".to_string(),
        });
        let (status, json) = body_json(err).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "backend_unavailable");
        assert_eq!(json["step"], "write");
    }

    #[tokio::test]
    async fn test_write_failed_response() {
        let err = GatewayError::from(IngestError::WriteFailed {
            step: PipelineStep::Write,
            reason: "mapping conflict".to_string(),
        });
        let (status, json) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "write_failed");
    }

    #[tokio::test]
    async fn test_bulk_failures_listed() {
        let err = GatewayError::from(IngestError::BulkItemsFailed {
            failures: vec![BulkItemFailure {
                index: 1,
                reason: "mapper_parsing_exception".to_string(),
            }],
        });
        let (status, json) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "bulk_items_failed");
        assert_eq!(json["step"], "bulk_write");
        assert_eq!(json["failures"][0]["index"], 1);
        assert_eq!(json["failures"][0]["reason"], "mapper_parsing_exception");
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Config("max_body_bytes must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_body_bytes must be greater than 0"
        );
    }
}
