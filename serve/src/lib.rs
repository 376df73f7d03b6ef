//! HTTP surface for fathom (axum + SSE).
//!
//! One small API: create a session, stream a query's answer as server-sent
//! events, read the session history, clear it. The orchestrator and session
//! store are injected so tests can run the full server against scripted
//! models on an ephemeral port.
//!
//! **Public API**: [`run_serve_on_listener`], [`app::router`].

pub mod app;
mod query;
mod sessions;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use fathom::{Orchestrator, SessionStore};

pub use app::AppState;
pub use sessions::SESSION_COOKIE;

/// Serves the API on an existing listener. Tests bind `127.0.0.1:0` and pass
/// the listener in; the binary binds the configured address.
pub async fn run_serve_on_listener(
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<dyn SessionStore>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("fathom API listening on http://{}", addr);

    let state = Arc::new(AppState {
        orchestrator,
        sessions,
    });
    axum::serve(listener, app::router(state)).await?;
    Ok(())
}
