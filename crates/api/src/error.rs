use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use querybox_models::{ErrorResponse, SandboxError};
use tracing::warn;

/// Errors returned by handlers
#[derive(Debug)]
pub enum ApiError {
    Sandbox(SandboxError),
    /// Body could not be decoded
    InvalidRequest(String),
    /// Missing or wrong operator token
    Unauthorized(String),
    /// Endpoint switched off by configuration
    Disabled(String),
}

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        ApiError::Sandbox(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::Sandbox(err) => {
                if let SandboxError::RegistryLoadFailed { reason } = &err {
                    warn!(reason = %reason, "Registry unavailable");
                }
                ErrorResponse::from(err)
            }
            ApiError::InvalidRequest(message) => plain_error("invalid_request", message, 400),
            ApiError::Unauthorized(message) => plain_error("unauthorized", message, 401),
            ApiError::Disabled(message) => plain_error("disabled", message, 403),
        };

        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

fn plain_error(error: &str, message: String, code: u16) -> ErrorResponse {
    ErrorResponse {
        success: false,
        error: error.to_string(),
        message,
        code,
        retryable: false,
        timestamp: chrono::Utc::now(),
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_taxonomy() {
        let cases = [
            (
                SandboxError::InvalidNamespace {
                    namespace: "bad;name".to_string(),
                    reason: "bad char".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                SandboxError::UnknownNamespace {
                    namespace: "asgn_missing".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                SandboxError::ForbiddenOperation {
                    reason: "DROP statements are not permitted in the sandbox".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                SandboxError::PoolExhausted {
                    reason: "timed out".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let response = ApiError::InvalidRequest("expected JSON".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
