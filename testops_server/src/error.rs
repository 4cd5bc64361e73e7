//! Error types for route handlers and remote gateways.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Task is missing something it needs (Jenkins job, repository link).
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    UnsupportedOperation(String),
    #[error("{0} not found")]
    NotFound(String),
    /// Operation needs a settled build but Jenkins still reports one running.
    #[error("Jenkins job '{0}' is still building")]
    StillBuilding(String),
    /// Job config XML could not be patched; nothing was written back.
    #[error("job config for '{job}' cannot be updated: {reason}")]
    ConfigXml { job: String, reason: String },
    /// Jenkins answered a read that has no degraded fallback.
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Validation(_) | Self::UnsupportedOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StillBuilding(_) => StatusCode::CONFLICT,
            Self::Remote(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigXml { .. } | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected(_) | Self::ConfigXml { .. })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// A Jenkins or GitHub call that did not produce the expected answer.
///
/// `status` is `None` when no HTTP response arrived at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "HTTP {code}: {}", self.message),
            None => write!(f, "Connection error: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::Configuration("no job".into()), StatusCode::BAD_REQUEST)]
    #[case(ApiError::NotFound("Plan 4".into()), StatusCode::NOT_FOUND)]
    #[case(ApiError::StillBuilding("nightly".into()), StatusCode::CONFLICT)]
    #[case(ApiError::Remote(RemoteError::connection("refused")), StatusCode::BAD_GATEWAY)]
    #[case(ApiError::Unexpected(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_to_http_status(#[case] err: ApiError, #[case] expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[test]
    fn remote_error_message_names_the_failure() {
        assert_eq!(RemoteError::http(404, "missing").to_string(), "HTTP 404: missing");
        assert_eq!(
            RemoteError::connection("refused").to_string(),
            "Connection error: refused"
        );
    }
}
