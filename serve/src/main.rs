//! fathom-serve: wire config, models, and the session store, then listen.
//!
//! Concrete research tools are deployment-supplied; this binary starts with
//! an empty registry, which still answers (reason-only plans) and is enough
//! to exercise the surface end to end.

use std::sync::Arc;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use fathom::llm::ChatOpenAI;
use fathom::{
    AgentConfig, ContextStore, InMemorySessionStore, Orchestrator, SessionBackend, ToolRegistry,
};

const DEFAULT_ADDR: &str = "127.0.0.1:8377";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_config::load_and_apply("fathom", None)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AgentConfig::from_env();
    if let SessionBackend::External(url) = &config.session_backend {
        warn!(url = %url, "external session store configured but no backend linked, staying in-memory");
    }

    let model = std::env::var("FATHOM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
    let fast_model =
        std::env::var("FATHOM_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ChatOpenAI::new(model)),
        Arc::new(ChatOpenAI::new(fast_model)),
        Arc::new(ToolRegistry::new()),
        Arc::new(ContextStore::new(&config.context_root)),
        config,
    ));

    let addr = std::env::var("FATHOM_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve::run_serve_on_listener(listener, orchestrator, sessions).await
}
