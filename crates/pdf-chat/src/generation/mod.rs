//! Prompt templates and the history-aware conversation chain

pub mod chain;
pub mod prompt;

pub use chain::{ChainSettings, ConversationChain, ChatTurn};
pub use prompt::{PromptMessage, PromptRole, PromptTemplate};
