//! LLM client abstraction used by every phase.
//!
//! Two tiers share one trait: the reasoning model (understand / plan /
//! reflect / reason tasks / answer) and a small fast model (tool selection,
//! relevance judgement, turn summaries). The trait covers plain completion,
//! tool-calling mode, and token streaming; [`MockLlm`] scripts all three for
//! tests, [`ChatOpenAI`] talks to an OpenAI-compatible API.

mod embedding;
mod mock;
mod openai;

pub use embedding::{cosine_similarity, Embedder, OpenAiEmbedder};
pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::Message;
use crate::tools::ToolSpec;

/// One tool invocation requested by the model in tool-calling mode.
///
/// `arguments` is the raw JSON string as returned by the API; callers parse
/// it when they need a value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LlmToolCall {
    /// Tool name as listed in the request's tool specs.
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
    /// Provider call id, when given.
    pub id: Option<String>,
}

/// Token usage for one call, when the provider reports it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion result: assistant text plus any requested tool calls.
#[derive(Debug)]
pub struct LlmResponse {
    /// Assistant message content.
    pub content: String,
    /// Tool calls; empty outside tool-calling mode or when the model chose none.
    pub tool_calls: Vec<LlmToolCall>,
    /// Usage, when available.
    pub usage: Option<LlmUsage>,
}

/// Chat model client.
///
/// `invoke_with_tools` puts the model in tool-calling mode with the given
/// specs; the default implementation ignores the specs so text-only clients
/// stay valid. `invoke_stream` sends each token through `chunk_tx` as it
/// arrives and still returns the complete response; the default sends the
/// full content as one chunk.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion: read messages, return assistant content.
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError>;

    /// Completion in tool-calling mode with the given tool specs.
    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.invoke(messages).await
    }

    /// Streaming completion; tokens go through `chunk_tx` when present.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.invoke(messages).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx.send(response.content.clone()).await;
            }
        }
        Ok(response)
    }
}

/// Parses a structured LLM output into `T`.
///
/// Tolerates a fenced ```json block around the payload; anything else that
/// fails serde is [`AgentError::Malformed`] for the named phase (fatal for
/// the turn per the propagation policy).
pub fn parse_structured<T: DeserializeOwned>(
    phase: &'static str,
    raw: &str,
) -> Result<T, AgentError> {
    let body = strip_code_fence(raw.trim());
    serde_json::from_str(body).map_err(|e| AgentError::malformed(phase, e.to_string()))
}

/// Removes a surrounding markdown code fence (``` or ```json) if present.
fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        value: u32,
    }

    struct EchoLlm(String);

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn invoke(&self, _messages: &[Message]) -> Result<LlmResponse, AgentError> {
            Ok(LlmResponse {
                content: self.0.clone(),
                tool_calls: vec![],
                usage: None,
            })
        }
    }

    /// **Scenario**: Bare JSON parses.
    #[test]
    fn parse_structured_bare_json() {
        let p: Probe = parse_structured("test", r#"{"value": 7}"#).unwrap();
        assert_eq!(p.value, 7);
    }

    /// **Scenario**: A ```json fenced block is stripped before parsing.
    #[test]
    fn parse_structured_fenced_json() {
        let raw = "```json\n{\"value\": 3}\n```";
        let p: Probe = parse_structured("test", raw).unwrap();
        assert_eq!(p.value, 3);
    }

    /// **Scenario**: Prose instead of JSON is a Malformed error naming the phase.
    #[test]
    fn parse_structured_prose_is_malformed() {
        let err = parse_structured::<Probe>("reflect", "I think we are done.").unwrap_err();
        assert!(matches!(err, AgentError::Malformed { phase: "reflect", .. }));
    }

    /// **Scenario**: Default invoke_stream sends the whole content as one chunk.
    #[tokio::test]
    async fn default_stream_sends_single_chunk() {
        let llm = EchoLlm("hello".into());
        let (tx, mut rx) = mpsc::channel(2);
        let resp = llm.invoke_stream(&[], Some(tx)).await.unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    /// **Scenario**: Default invoke_with_tools falls back to plain invoke.
    #[tokio::test]
    async fn default_with_tools_delegates() {
        let llm = EchoLlm("ok".into());
        let resp = llm.invoke_with_tools(&[], &[]).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert!(resp.tool_calls.is_empty());
    }
}
