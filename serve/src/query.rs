//! Streaming query endpoint.
//!
//! Runs one turn and streams the answer as server-sent events: one `token`
//! event per model token, then a single `done` event. The session's history
//! is written back to the store only after the token stream has completed:
//! the orchestrator appends the turn when its stream ends, so the snapshot
//! taken in the terminal event already contains it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use stream_frame::{DoneFrame, TokenFrame, DONE_EVENT, TOKEN_EVENT};

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// The user's question.
    pub query: String,
    /// Session to continue; a fresh session is allocated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /query`: body `{query, session_id?}`, response `text/event-stream`.
///
/// Phase-fatal orchestrator errors happen before any token is produced and
/// surface as a 502 JSON error instead of a stream.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> axum::response::Response {
    let session_id = body
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request_id = uuid::Uuid::new_v4().to_string();
    debug!(session_id = %session_id, request_id = %request_id, "query received");

    let history = state.sessions.get(&session_id).await.unwrap_or_default();
    let history = Arc::new(Mutex::new(history));

    let answer = match state.orchestrator.run(&body.query, history.clone()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "turn failed before answer phase");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let rid = request_id.clone();
    let tokens = answer.enumerate().map(move |(i, token)| {
        let mut frame = TokenFrame::new(token).with_request_id(rid.clone());
        if i == 0 {
            frame = frame.with_role("assistant");
        }
        Ok::<Event, Infallible>(to_event(TOKEN_EVENT, &frame))
    });

    let sessions = state.sessions.clone();
    let done = stream::once(async move {
        // The answer stream has ended, so the orchestrator has already
        // appended the turn (or skipped it on failure); publish the result.
        let snapshot = history.lock().await.clone();
        let turns = snapshot.len();
        sessions.set(&session_id, snapshot).await;
        let frame = DoneFrame {
            request_id: Some(request_id),
            turns,
        };
        Ok::<Event, Infallible>(to_event(DONE_EVENT, &frame))
    });

    Sse::new(tokens.chain(done))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn to_event<T: serde::Serialize>(name: &str, frame: &T) -> Event {
    match Event::default().event(name).json_data(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "frame serialization failed");
            Event::default().event(name).data("{}")
        }
    }
}
