//! Session endpoints: create, history, clear.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::debug;

use crate::app::AppState;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "fathom_session";

/// `POST /sessions`: allocates a session id. The history itself is created
/// lazily on the first query.
pub async fn create(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    debug!(session_id = %session_id, "session created");
    let cookie = format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session_id);
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "session_id": session_id })),
    )
}

/// `GET /sessions/:id/history`: the session's turns. An unknown session
/// reads as empty rather than 404, matching the orchestrator's view.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let history = state.sessions.get(&session_id).await.unwrap_or_default();
    let messages: Vec<_> = history
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "query": t.query,
                "answer": t.answer,
                "summary": t.summary,
            })
        })
        .collect();
    Json(json!({
        "session_id": session_id,
        "turns": history.len(),
        "messages": messages,
    }))
}

/// `DELETE /sessions/:id/history`: drops the session's history.
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    state.sessions.delete(&session_id).await;
    StatusCode::NO_CONTENT
}
