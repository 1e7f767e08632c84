use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::io;

/// Custom error type for deploy_hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("forbidden, no signature")]
    MissingSignature,

    #[error("forbidden, invalid signature")]
    InvalidSignature,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    #[error("Cache invalidation failed: {0}")]
    InvalidationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl HookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HookError::MissingSignature | HookError::InvalidSignature => StatusCode::FORBIDDEN,
            HookError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal failures never leak their details to the webhook caller
        let message = if status.is_server_error() {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, message).into_response()
    }
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            HookError::MissingSignature.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            HookError::InvalidSignature.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            HookError::BadRequest("no ref".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HookError::BadRequest("no ref".into()).to_string(),
            "bad request: no ref"
        );
    }

    #[test]
    fn test_internal_errors_map_to_500() {
        let err = HookError::ScriptExecutionFailed("boom".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
