//! # Fathom
//!
//! An autonomous research agent core for financial questions. One turn runs
//! five phases (understand → plan → execute → reflect → answer) over a set
//! of named, schema-typed tools the host registers. The real engineering
//! lives in four places:
//!
//! - [`agent`]: the [`Orchestrator`] state machine, the dependency-scheduled
//!   [`TaskExecutor`], and the just-in-time [`ToolExecutor`].
//! - [`context`]: the content-addressed [`ContextStore`] that keeps full tool
//!   payloads on disk and relevance-filters them into prompts.
//! - [`history`]: the per-session [`MessageHistory`] that participates in
//!   every phase of every later turn.
//! - [`session`]: the [`SessionStore`] interface (in-memory default) the HTTP
//!   surface binds turns to.
//!
//! The LLM transport ([`LlmClient`]), tool implementations ([`Tool`]), and
//! session backends are injected; the core never names a vendor outside
//! [`llm::ChatOpenAI`] and [`llm::OpenAiEmbedder`].
//!
//! ## One turn
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fathom::{AgentConfig, ContextStore, MessageHistory, Orchestrator, ToolRegistry};
//! use fathom::llm::ChatOpenAI;
//! use tokio::sync::Mutex;
//! use tokio_stream::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), fathom::AgentError> {
//! let config = AgentConfig::from_env();
//! let orchestrator = Orchestrator::new(
//!     Arc::new(ChatOpenAI::new("gpt-4o")),
//!     Arc::new(ChatOpenAI::new("gpt-4o-mini")),
//!     Arc::new(ToolRegistry::new()),
//!     Arc::new(ContextStore::new(&config.context_root)),
//!     config,
//! );
//! let history = Arc::new(Mutex::new(MessageHistory::new()));
//! let mut stream = orchestrator.run("What is EUR/USD?", history.clone()).await?;
//! while let Some(token) = stream.next().await {
//!     print!("{}", token);
//! }
//! assert_eq!(history.lock().await.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod hash;
pub mod history;
pub mod llm;
pub mod message;
pub mod session;
pub mod tools;

pub use agent::{
    AgentEvent, AnswerStream, Orchestrator, Phase, Plan, Reflection, Task, TaskExecutor,
    TaskResult, TaskStatus, TaskType, ToolCall, ToolCallStatus, ToolExecutor, Understanding,
};
pub use config::{AgentConfig, SessionBackend};
pub use context::{ContextPointer, ContextRecord, ContextStore};
pub use error::AgentError;
pub use history::{MessageHistory, Summarizer, Turn, TurnSelector};
pub use llm::{ChatOpenAI, Embedder, LlmClient, LlmResponse, MockLlm, OpenAiEmbedder};
pub use message::Message;
pub use session::{InMemorySessionStore, SessionStore};
pub use tools::{Tool, ToolError, ToolRegistry, ToolSpec};
