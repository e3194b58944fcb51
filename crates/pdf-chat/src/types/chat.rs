//! Conversation and HTTP wire types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The user
    Human,
    /// The assistant
    Ai,
}

/// One message of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a human message
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Human,
            content: content.into(),
        }
    }

    /// Create an ai message
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Ai,
            content: content.into(),
        }
    }
}

/// Stages a conversation turn moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStage {
    Received,
    QueryRewritten,
    Retrieved,
    Answered,
    HistoryUpdated,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStage::Received => "RECEIVED",
            TurnStage::QueryRewritten => "QUERY_REWRITTEN",
            TurnStage::Retrieved => "RETRIEVED",
            TurnStage::Answered => "ANSWERED",
            TurnStage::HistoryUpdated => "HISTORY_UPDATED",
        };
        f.write_str(name)
    }
}

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
    /// Conversation to continue (default conversation when absent)
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Successful `POST /chat` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// `GET /chat/history` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&ChatMessage::human("hi")).unwrap();
        assert_eq!(json, r#"{"role":"human","content":"hi"}"#);
        let json = serde_json::to_string(&ChatMessage::ai("hello")).unwrap();
        assert_eq!(json, r#"{"role":"ai","content":"hello"}"#);
    }

    #[test]
    fn test_request_session_is_optional() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"What is A3?"}"#).unwrap();
        assert_eq!(request.message, "What is A3?");
        assert!(request.session_id.is_none());
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(TurnStage::Received < TurnStage::QueryRewritten);
        assert!(TurnStage::Answered < TurnStage::HistoryUpdated);
        assert_eq!(TurnStage::QueryRewritten.to_string(), "QUERY_REWRITTEN");
    }
}
