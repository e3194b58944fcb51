//! pdf-chat: conversational question answering over a single document
//!
//! At startup one PDF (or text file) is loaded, split into overlapping chunks,
//! embedded through Ollama and held in an in-memory vector index. Each chat
//! message is rewritten into a standalone query using the conversation so far,
//! matched against the index, and answered by the language model with the
//! retrieved chunks as context.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod types;

pub use config::ChatConfig;
pub use error::{Error, Result};
pub use generation::{ChainSettings, ChatTurn, ConversationChain};
pub use server::{state::AppState, ChatServer};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Chunk, TurnStage};
