//! Chat endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::session::{SessionStore, MAX_SESSION_ID_CHARS};
use crate::types::{ChatRequest, ChatResponse};

/// POST /chat - Answer one message in the context of its session
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge(rejection.body_text())
        } else {
            Error::BadRequest(rejection.body_text())
        }
    })?;

    if request.message.trim().is_empty() {
        return Err(Error::BadRequest("message must not be empty".to_string()));
    }
    let max_chars = state.config().server.max_message_chars;
    let chars = request.message.chars().count();
    if chars > max_chars {
        return Err(Error::PayloadTooLarge(format!(
            "message has {} characters, limit is {}",
            chars, max_chars
        )));
    }

    let session_id = SessionStore::resolve(request.session_id.as_deref()).to_string();
    if session_id.chars().count() > MAX_SESSION_ID_CHARS {
        return Err(Error::BadRequest(format!(
            "session_id is longer than {} characters",
            MAX_SESSION_ID_CHARS
        )));
    }

    let start = Instant::now();
    let sessions = state.sessions();
    let session = sessions.lookup(Some(&session_id));
    tracing::info!("Chat [{}]: \"{}\"", session_id, request.message);

    let turn = state
        .chain()
        .respond(&session, &request.message)
        .await
        .map_err(|e| {
            tracing::error!("Chat [{}] failed: {}", session_id, e);
            e
        })?;
    sessions.keep(Some(&session_id), session);

    tracing::info!(
        "Chat [{}] answered in {}ms ({} sources)",
        session_id,
        start.elapsed().as_millis(),
        turn.sources.len()
    );

    Ok(Json(ChatResponse {
        response: turn.answer,
    }))
}
