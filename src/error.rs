//! Error types for the alpha loop orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Timeout, non-2xx status or transport failure. Retried by the fetcher.
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Credential missing: {0}")]
    CredentialMissing(String),

    #[error("All models exhausted for {task}: {reason}")]
    ModelExhausted { task: String, reason: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Artifact store error: {0}")]
    ArtifactError(String),

    #[error("Job error: {0}")]
    JobError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Only network-class failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::NetworkError(_) | OrchestrationError::HttpError(_)
        )
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        OrchestrationError::ConfigError(message.into())
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        OrchestrationError::ParseError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OrchestrationError::NetworkError("HTTP 503".into()).is_retryable());
        assert!(!OrchestrationError::CredentialMissing("FRED".into()).is_retryable());
        assert!(!OrchestrationError::parse("bad body").is_retryable());
        assert!(!OrchestrationError::ModelExhausted {
            task: "outlook".into(),
            reason: "3 models failed".into(),
        }
        .is_retryable());
    }
}
