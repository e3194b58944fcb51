//! Configuration for the chat service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::generation::prompt::{PromptTemplate, ANSWER_SLOTS, REWRITE_SLOTS};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Source document configuration
    pub document: DocumentConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Retrieval and history configuration
    pub retrieval: RetrievalConfig,
    /// Prompt templates
    pub prompts: PromptConfig,
}

impl ChatConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.llm.chat_model.trim().is_empty() || self.llm.embed_model.trim().is_empty() {
            return Err(Error::Config("llm model names must not be empty".to_string()));
        }
        if self.llm.embed_batch_size == 0 {
            return Err(Error::Config("llm.embed_batch_size must be positive".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".to_string()));
        }
        reqwest::Url::parse(&self.llm.base_url)
            .map_err(|e| Error::Config(format!("Invalid llm.base_url '{}': {}", self.llm.base_url, e)))?;
        if self.document.extract_timeout_secs == 0 {
            return Err(Error::Config("document.extract_timeout_secs must be positive".to_string()));
        }
        if self.server.max_message_chars == 0 {
            return Err(Error::Config("server.max_message_chars must be positive".to_string()));
        }

        self.prompts.answer.validate(&ANSWER_SLOTS)?;
        self.prompts.rewrite.validate(&REWRITE_SLOTS)?;

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Directory served at `/` for unmatched paths (disabled when unset)
    pub static_dir: Option<PathBuf>,
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
    /// Maximum length of a chat message in characters
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8989,
            enable_cors: true,
            static_dir: Some(PathBuf::from(".")),
            max_body_bytes: 64 * 1024,
            max_message_chars: 4000,
        }
    }
}

/// Source document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Path of the document ingested at startup
    pub path: PathBuf,
    /// Deadline for text extraction in seconds
    pub extract_timeout_secs: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./pdf-document/renseignements.pdf"),
            extract_timeout_secs: 60,
        }
    }
}

impl DocumentConfig {
    /// Extraction deadline as a `Duration`
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 250,
            chunk_overlap: 50,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Chat/generation model name
    pub chat_model: String,
    /// Embedding model name
    pub embed_model: String,
    /// Sampling temperature (model default when unset)
    pub temperature: Option<f32>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Number of texts sent per embedding request during ingestion
    pub embed_batch_size: usize,
    /// Retry policy for model calls
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embed_model: "llama3.2".to_string(),
            temperature: None,
            timeout_secs: 120,
            embed_batch_size: 32,
            retry: RetryPolicy::default(),
        }
    }
}

/// Bounded exponential backoff for model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Retrieval and conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Most recent turns (human + ai pairs) used to rewrite follow-up questions
    pub rewrite_history_turns: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 2,
            rewrite_history_turns: 2,
        }
    }
}

/// Prompt templates used by the conversation chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Template for the grounded answer
    pub answer: PromptTemplate,
    /// Template for the standalone search query
    pub rewrite: PromptTemplate,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            answer: PromptTemplate::default_answer(),
            rewrite: PromptTemplate::default_rewrite(),
        }
    }
}
