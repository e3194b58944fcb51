//! Core types for the chat service

pub mod chat;
pub mod document;

pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole, HistoryResponse, TurnStage};
pub use document::{Chunk, FileType, LoadedDocument, PageText};
