//! Provider abstractions for embeddings and the language model
//!
//! The conversation chain only sees these traits; `ollama` implements both
//! against a hosted Ollama server.

pub mod embedding;
pub mod llm;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use ollama::{ollama_providers, OllamaClient, OllamaEmbedder, OllamaLlm};
