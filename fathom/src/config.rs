//! Agent configuration from the environment.
//!
//! All knobs are plain env vars (the `config` crate fills them from `.env` /
//! XDG TOML at startup). Unset or unparseable values fall back to defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Where session histories live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBackend {
    /// Process-local map (default).
    InMemory,
    /// External key/value store, addressed by connection string. The core
    /// only consumes the [`crate::session::SessionStore`] interface; linking
    /// an implementation is the host's job.
    External(String),
}

/// Recognised configuration, resolved once per process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hard ceiling on plan→execute→reflect loops per turn.
    pub max_iterations: u32,
    /// Use the fast model for turn summaries instead of the preview.
    pub summarize_via_llm: bool,
    /// Select prior turns by embedding similarity instead of recency.
    pub use_embeddings_for_selection: bool,
    /// Recency / top-K window for relevance selection.
    pub max_context_messages: usize,
    /// Root directory of the context store.
    pub context_root: PathBuf,
    /// Session storage backend.
    pub session_backend: SessionBackend,
    /// Idle session lifetime.
    pub session_ttl: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            summarize_via_llm: false,
            use_embeddings_for_selection: false,
            max_context_messages: 10,
            context_root: PathBuf::from("./fathom-context"),
            session_backend: SessionBackend::InMemory,
            session_ttl: Duration::from_secs(3600),
        }
    }
}

impl AgentConfig {
    /// Reads `FATHOM_*` env vars, defaulting anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_parse("FATHOM_MAX_ITERATIONS", defaults.max_iterations),
            summarize_via_llm: env_flag("FATHOM_SUMMARIZE_VIA_LLM", defaults.summarize_via_llm),
            use_embeddings_for_selection: env_flag(
                "FATHOM_USE_EMBEDDINGS_FOR_SELECTION",
                defaults.use_embeddings_for_selection,
            ),
            max_context_messages: env_parse(
                "FATHOM_MAX_CONTEXT_MESSAGES",
                defaults.max_context_messages,
            ),
            context_root: std::env::var("FATHOM_CONTEXT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.context_root),
            session_backend: match std::env::var("FATHOM_SESSION_STORE_URL") {
                Ok(url) if !url.trim().is_empty() => SessionBackend::External(url),
                _ => SessionBackend::InMemory,
            },
            session_ttl: Duration::from_secs(env_parse(
                "FATHOM_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Defaults match the documented table.
    #[test]
    fn defaults() {
        let c = AgentConfig::default();
        assert_eq!(c.max_iterations, 5);
        assert!(!c.summarize_via_llm);
        assert!(!c.use_embeddings_for_selection);
        assert_eq!(c.max_context_messages, 10);
        assert_eq!(c.session_backend, SessionBackend::InMemory);
    }

    /// **Scenario**: Env overrides are picked up; garbage falls back to defaults.
    #[test]
    fn env_overrides_and_garbage() {
        std::env::set_var("FATHOM_MAX_ITERATIONS", "2");
        std::env::set_var("FATHOM_SUMMARIZE_VIA_LLM", "true");
        std::env::set_var("FATHOM_MAX_CONTEXT_MESSAGES", "not-a-number");
        let c = AgentConfig::from_env();
        std::env::remove_var("FATHOM_MAX_ITERATIONS");
        std::env::remove_var("FATHOM_SUMMARIZE_VIA_LLM");
        std::env::remove_var("FATHOM_MAX_CONTEXT_MESSAGES");

        assert_eq!(c.max_iterations, 2);
        assert!(c.summarize_via_llm);
        assert_eq!(c.max_context_messages, 10, "unparseable falls back");
    }

    /// **Scenario**: A connection string selects the external backend.
    #[test]
    fn external_backend_from_url() {
        std::env::set_var("FATHOM_SESSION_STORE_URL", "redis://localhost:6379");
        let c = AgentConfig::from_env();
        std::env::remove_var("FATHOM_SESSION_STORE_URL");
        assert_eq!(
            c.session_backend,
            SessionBackend::External("redis://localhost:6379".into())
        );
    }
}
