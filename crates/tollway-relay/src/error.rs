use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tollway_core::HttpError;

use crate::patch::PatchError;
use crate::protocol::{ErrorEnvelope, UpstreamErrorBody};

/// Error type rendered for failures that originate inside the gateway
const GATEWAY_ERROR_TYPE: &str = "tollway_error";

/// Errors that can occur while relaying an upstream response
#[derive(Debug, Error)]
pub enum RelayError {
    /// Reading the upstream or writing the caller failed
    #[error("{code}: {source}")]
    Io {
        /// Machine-readable failure code
        code: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The upstream body could not be decoded
    #[error("{code}: {source}")]
    Decode {
        /// Machine-readable failure code
        code: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The upstream body could not be patched
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// The upstream declared an error in its response body
    #[error("upstream error ({status}): {}", error.message)]
    Upstream {
        /// Status the upstream answered with
        status: StatusCode,
        /// Error object exactly as the upstream declared it
        error: UpstreamErrorBody,
    },

    /// Recounting found no completion tokens to bill
    #[error("CompletionTokens is still zero after calculation.")]
    ZeroUsage,

    /// The upstream went quiet for longer than the inactivity timeout
    #[error("streaming timeout after {0:?}")]
    StreamTimeout(Duration),
}

impl RelayError {
    /// Wrap an I/O failure under a machine-readable code
    pub fn io(code: &'static str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Io {
            code,
            source: source.into(),
        }
    }

    /// Wrap a decode failure under a machine-readable code
    pub const fn decode(code: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { code, source }
    }

    /// The `OpenAI` error object returned to the caller
    pub fn to_error_body(&self) -> UpstreamErrorBody {
        if let Self::Upstream { error, .. } = self {
            return error.clone();
        }

        UpstreamErrorBody {
            message: self.client_message(),
            error_type: self.error_type().to_owned(),
            param: None,
            code: self.error_code().map(|code| Value::String(code.to_owned())),
        }
    }
}

impl HttpError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Io { .. } | Self::Decode { .. } | Self::Patch(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status, .. } => *status,
            Self::ZeroUsage => StatusCode::TOO_MANY_REQUESTS,
            Self::StreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Io { .. } | Self::Decode { .. } | Self::Patch(_) | Self::StreamTimeout(_) => GATEWAY_ERROR_TYPE,
            Self::Upstream { error, .. } => error.error_type.as_str(),
            Self::ZeroUsage => "rate_limit_exceeded",
        }
    }

    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Io { code, .. } | Self::Decode { code, .. } => Some(*code),
            Self::Patch(_) => Some("process_response_body_failed"),
            Self::Upstream { error, .. } => error.code.as_ref().and_then(Value::as_str),
            Self::ZeroUsage => Some("rate_limit_exceeded"),
            Self::StreamTimeout(_) => Some("streaming_timeout"),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Upstream { error, .. } => error.message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = self.to_error_body();
        (self.status_code(), Json(ErrorEnvelope { error: &body })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zero_usage_is_rate_limited() {
        let err = RelayError::ZeroUsage;
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "rate_limit_exceeded");
        assert_eq!(
            err.to_error_body().message,
            "CompletionTokens is still zero after calculation."
        );
    }

    #[test]
    fn io_errors_carry_their_code() {
        let err = RelayError::io("read_response_body_failed", std::io::Error::other("reset"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = err.to_error_body();
        assert_eq!(body.error_type, "tollway_error");
        assert_eq!(body.code, Some(json!("read_response_body_failed")));
        assert!(body.message.starts_with("read_response_body_failed: "));
    }

    #[test]
    fn upstream_errors_pass_through() {
        let declared = UpstreamErrorBody {
            message: "context too long".to_owned(),
            error_type: "invalid_request_error".to_owned(),
            param: Some(json!("messages")),
            code: Some(json!("context_length_exceeded")),
        };
        let err = RelayError::Upstream {
            status: StatusCode::BAD_REQUEST,
            error: declared.clone(),
        };

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "invalid_request_error");
        assert_eq!(err.error_code(), Some("context_length_exceeded"));
        assert_eq!(err.to_error_body(), declared);
    }

    #[tokio::test]
    async fn renders_openai_error_envelope() {
        use http_body_util::BodyExt;

        let response = RelayError::ZeroUsage.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "error": {
                    "message": "CompletionTokens is still zero after calculation.",
                    "type": "rate_limit_exceeded",
                    "param": null,
                    "code": "rate_limit_exceeded"
                }
            })
        );
    }
}
