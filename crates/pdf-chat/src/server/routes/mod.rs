//! API routes for the chat server

pub mod chat;
pub mod history;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build the chat routes
pub fn chat_routes(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/chat",
            post(chat::chat).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route(
            "/chat/history",
            get(history::get_history).delete(history::clear_history),
        )
}
