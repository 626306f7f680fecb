use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inference_client::ClientError;
use thiserror::Error;

use crate::FALLBACK_REPLY;

/// Body of every non-200 answer. `reply` is always present so callers that
/// only read `reply` still get something printable.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub reply: String,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Upstream(#[from] ClientError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Upstream(ClientError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Upstream(ClientError::Unreachable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Upstream(ClientError::InvalidConfiguration(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "bad_request",
            RelayError::Upstream(ClientError::Timeout) => "upstream_timeout",
            RelayError::Upstream(ClientError::Unreachable(_)) => "upstream_unreachable",
            RelayError::Upstream(ClientError::InvalidConfiguration(_)) => "internal_error",
            RelayError::Upstream(_) => "upstream_error",
        }
    }

    /// Caller-facing detail. Upstream failures are summarized so upstream
    /// bodies and addresses stay in the logs only.
    fn public_message(&self) -> String {
        match self {
            RelayError::BadRequest(detail) => detail.clone(),
            RelayError::Upstream(ClientError::Timeout) => "inference service timed out".into(),
            RelayError::Upstream(ClientError::Unreachable(_)) => {
                "inference service is unreachable".into()
            }
            RelayError::Upstream(ClientError::InvalidConfiguration(_)) => {
                "relay is misconfigured".into()
            }
            RelayError::Upstream(_) => "inference service returned an invalid response".into(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::warn!("Request rejected with {}: {}", status, self);
        }

        let body = ErrorResponse {
            reply: FALLBACK_REPLY.to_string(),
            error: self.kind().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
