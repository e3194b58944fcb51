//! Session history endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::server::state::AppState;
use crate::session::SessionStore;
use crate::types::HistoryResponse;

/// Optional session selector
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub session_id: Option<String>,
}

/// GET /chat/history - Messages of a session, oldest first
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    let messages = state
        .sessions()
        .get(params.session_id.as_deref())
        .map(|s| s.snapshot())
        .unwrap_or_default();

    Json(HistoryResponse {
        session_id: SessionStore::resolve(params.session_id.as_deref()).to_string(),
        messages,
    })
}

/// DELETE /chat/history - Forget a session
pub async fn clear_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> StatusCode {
    if state.sessions().remove(params.session_id.as_deref()) {
        tracing::info!(
            "Removed session {}",
            SessionStore::resolve(params.session_id.as_deref())
        );
    }
    StatusCode::NO_CONTENT
}
