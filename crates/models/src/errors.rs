use thiserror::Error;

/// Sandbox errors
///
/// Every variant is scoped to a single request. Validation failures
/// (`InvalidNamespace`, `UnknownNamespace`, `ForbiddenOperation`,
/// `InvalidStatement`) are produced before any connection is acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Invalid namespace \"{namespace}\": {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("Unknown namespace: {namespace}")]
    UnknownNamespace { namespace: String },

    #[error("Operation not permitted in the sandbox: {reason}")]
    ForbiddenOperation { reason: String },

    #[error("Invalid statement: {reason}")]
    InvalidStatement { reason: String },

    #[error("Connection pool exhausted: {reason}")]
    PoolExhausted { reason: String },

    #[error("Statement execution failed: {message}")]
    StatementExecution { message: String },

    #[error("Namespace registry load failed: {reason}")]
    RegistryLoadFailed { reason: String },
}

impl SandboxError {
    /// Stable, machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::InvalidNamespace { .. } => "invalid_namespace",
            SandboxError::UnknownNamespace { .. } => "unknown_namespace",
            SandboxError::ForbiddenOperation { .. } => "forbidden_operation",
            SandboxError::InvalidStatement { .. } => "invalid_statement",
            SandboxError::PoolExhausted { .. } => "pool_exhausted",
            SandboxError::StatementExecution { .. } => "statement_execution_error",
            SandboxError::RegistryLoadFailed { .. } => "registry_load_failed",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            SandboxError::InvalidNamespace { .. } => 400,
            SandboxError::InvalidStatement { .. } => 400,
            SandboxError::StatementExecution { .. } => 400,
            SandboxError::ForbiddenOperation { .. } => 403,
            SandboxError::UnknownNamespace { .. } => 404,
            SandboxError::PoolExhausted { .. } => 503,
            SandboxError::RegistryLoadFailed { .. } => 503,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SandboxError::PoolExhausted { .. } | SandboxError::RegistryLoadFailed { .. }
        )
    }

    /// True for errors caused by the caller's input rather than infrastructure
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SandboxError::InvalidNamespace { .. }
                | SandboxError::UnknownNamespace { .. }
                | SandboxError::ForbiddenOperation { .. }
                | SandboxError::InvalidStatement { .. }
                | SandboxError::StatementExecution { .. }
        )
    }

    /// Message safe to show end users.
    ///
    /// Registry load details stay internal; everything else is already
    /// caller-facing (database error text carries no secrets).
    pub fn public_message(&self) -> String {
        match self {
            SandboxError::RegistryLoadFailed { .. } => {
                "Namespace registry is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Error response for API endpoints
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub code: u16,
    pub retryable: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&SandboxError> for ErrorResponse {
    fn from(err: &SandboxError) -> Self {
        Self {
            success: false,
            error: err.kind().to_string(),
            message: err.public_message(),
            code: err.status_code(),
            retryable: err.is_retryable(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl From<SandboxError> for ErrorResponse {
    fn from(err: SandboxError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_caller_errors() {
        let err = SandboxError::ForbiddenOperation {
            reason: "DROP statements are not allowed".to_string(),
        };
        assert!(err.is_caller_error());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.kind(), "forbidden_operation");
    }

    #[test]
    fn test_pool_exhausted_is_retryable() {
        let err = SandboxError::PoolExhausted {
            reason: "timed out after 5s".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_caller_error());
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_registry_details_are_not_public() {
        let err = SandboxError::RegistryLoadFailed {
            reason: "connection refused (catalog.internal:5432)".to_string(),
        };
        let response = ErrorResponse::from(&err);
        assert!(!response.message.contains("catalog.internal"));
        assert_eq!(response.error, "registry_load_failed");
        assert!(response.retryable);
    }

    #[test]
    fn test_statement_errors_pass_database_text_through() {
        let err = SandboxError::StatementExecution {
            message: "relation \"employes\" does not exist".to_string(),
        };
        let response = ErrorResponse::from(err);
        assert!(response.message.contains("relation \"employes\" does not exist"));
        assert_eq!(response.code, 400);
        assert!(!response.success);
    }
}
