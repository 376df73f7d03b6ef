//! Axum app: shared state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use fathom::{Orchestrator, SessionStore};

use crate::{query, sessions};

/// Shared handler state: the orchestrator and the session backend.
pub struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            orchestrator,
            sessions,
        }
    }
}

/// Builds the router:
/// - `POST /sessions`: create a session (also sets the session cookie)
/// - `POST /query`: run a turn, streaming tokens as SSE
/// - `GET /sessions/:id/history`: list the session's turns
/// - `DELETE /sessions/:id/history`: clear the session's history
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", post(sessions::create))
        .route("/query", post(query::query))
        .route(
            "/sessions/:id/history",
            get(sessions::history).delete(sessions::clear),
        )
        .with_state(state)
}
