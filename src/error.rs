//! Error types for the finance assistant agents

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Agent Errors
    // =============================

    #[error("Market data error: {0}")]
    MarketDataError(String),

    #[error("News error: {0}")]
    NewsError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// The LLM provider rejected the call for quota or rate-limit reasons.
    #[error("LLM quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Voice error: {0}")]
    VoiceError(String),

    #[error("Agent '{agent}' unavailable: {reason}")]
    AgentUnavailable { agent: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

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

impl AssistantError {
    pub fn unavailable(agent: &str, reason: impl std::fmt::Display) -> Self {
        AssistantError::AgentUnavailable {
            agent: agent.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AssistantError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AssistantError::AgentUnavailable { .. } | AssistantError::HttpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            AssistantError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AssistantError::InvalidInput("empty".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AssistantError::unavailable("retriever", "connection refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AssistantError::RetrievalError("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unavailable_message() {
        let err = AssistantError::unavailable("language", "timed out");
        assert_eq!(err.to_string(), "Agent 'language' unavailable: timed out");
    }
}
