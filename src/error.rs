use thiserror::Error;

/// Main error type for recording, building and dispatching functions
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A rewrite step found nothing to rewrite. Reported as a warning, the build goes on.
    #[error("Pattern not found: {0}")]
    PatternMismatch(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Script launch error: {0}")]
    ScriptLaunch(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid function call: {0}")]
    InvalidFunctionCall(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: retry after {retry_after}s")]
    RateLimit { retry_after: u64 },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ActionError>;

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::RateLimit { .. } | ActionError::Timeout(_) | ActionError::Llm(_)
        )
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ActionError::Config(_) => "CONFIG_ERROR",
            ActionError::Validation(_) => "VALIDATION_ERROR",
            ActionError::Io(_) => "IO_ERROR",
            ActionError::Serialization(_) => "SERIALIZATION_ERROR",
            ActionError::PatternMismatch(_) => "BUILD_PATTERN_MISMATCH",
            ActionError::FunctionNotFound(_) => "FUNCTION_NOT_FOUND",
            ActionError::ScriptLaunch(_) => "SCRIPT_LAUNCH_ERROR",
            ActionError::Llm(_) => "LLM_ERROR",
            ActionError::InvalidFunctionCall(_) => "INVALID_FUNCTION_CALL",
            ActionError::Timeout(_) => "TIMEOUT_ERROR",
            ActionError::RateLimit { .. } => "RATE_LIMIT_ERROR",
        }
    }

    /// Convert to a structured error payload
    pub fn to_error_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "retryable": self.is_retryable()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload() {
        let payload = ActionError::RateLimit { retry_after: 5 }.to_error_payload();
        assert_eq!(payload["error"]["code"], "RATE_LIMIT_ERROR");
        assert_eq!(payload["error"]["retryable"], true);
        assert_eq!(
            payload["error"]["message"],
            "Rate limit exceeded: retry after 5s"
        );

        let payload = ActionError::Validation("bad".to_string()).to_error_payload();
        assert_eq!(payload["error"]["retryable"], false);
    }
}
