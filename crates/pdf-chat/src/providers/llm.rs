//! LLM provider trait for chat completions

use async_trait::async_trait;

use crate::error::Result;
use crate::generation::prompt::PromptMessage;

/// Trait for chat-style text generation
///
/// Implementations:
/// - `OllamaLlm`: hosted Ollama server (`/api/chat`)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the assistant reply to an ordered list of messages
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
