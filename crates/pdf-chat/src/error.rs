//! Error types for the chat service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::TurnStage;

/// Result type alias for chat service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chat service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document could not be loaded at startup
    #[error("Failed to load document '{}': {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorIndex(String),

    /// Query against an index with no entries
    #[error("Vector index is empty")]
    EmptyIndex,

    /// Prompt template error
    #[error("Prompt template error: {0}")]
    Prompt(String),

    /// A model call exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A conversation turn failed at the given stage
    #[error("Conversation turn failed after {stage}: {source}")]
    Orchestration {
        stage: TurnStage,
        #[source]
        source: Box<Error>,
    },

    /// Invalid client request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Client payload over the configured bound
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a load error for a document path
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a vector index error
    pub fn vector_index(message: impl Into<String>) -> Self {
        Self::VectorIndex(message.into())
    }

    /// Create a prompt error
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt(message.into())
    }

    /// Wrap a failure that happened after `stage` completed
    pub fn orchestration(stage: TurnStage, source: Error) -> Self {
        Self::Orchestration {
            stage,
            source: Box::new(source),
        }
    }

    /// Short machine-readable error type used in response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Load { .. } => "load_error",
            Error::Embedding(_) => "embedding_error",
            Error::Llm(_) => "llm_error",
            Error::VectorIndex(_) => "vector_index_error",
            Error::EmptyIndex => "empty_index",
            Error::Prompt(_) => "prompt_error",
            Error::Timeout(_) => "timeout",
            Error::Orchestration { .. } => "orchestration_error",
            Error::BadRequest(_) => "bad_request",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Message returned to clients; upstream addresses and transport details stay in the logs
    pub fn client_message(&self) -> String {
        match self {
            Error::BadRequest(_) | Error::PayloadTooLarge(_) => self.to_string(),
            Error::Orchestration { stage, source } => {
                format!("Conversation turn failed after {} ({})", stage, source.kind())
            }
            Error::Embedding(_) => "Embedding service request failed".to_string(),
            Error::Llm(_) => "Language model request failed".to_string(),
            Error::Timeout(_) => "Model request timed out".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Embedding(_) => StatusCode::BAD_GATEWAY,
            Error::Llm(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // The failing stage decides the status, the wrapper only adds context
            Error::Orchestration { source, .. } => match source.status() {
                status if status.is_client_error() => StatusCode::BAD_GATEWAY,
                status => status,
            },
            Error::Config(_)
            | Error::Load { .. }
            | Error::VectorIndex(_)
            | Error::EmptyIndex
            | Error::Prompt(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.client_message(),
            }
        }));

        (status, body).into_response()
    }
}
