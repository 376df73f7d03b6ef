//! Scripted mock LLM for tests.
//!
//! Responses are queued in order; each `invoke*` pops the next entry. The
//! mock records every request's messages so tests can assert on prompt
//! contents (e.g. that the answer prompt carries prior conversation).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::Message;
use crate::tools::ToolSpec;

use super::{LlmClient, LlmResponse, LlmToolCall};

/// One scripted reply: a canned response or an injected failure.
enum Scripted {
    Reply {
        content: String,
        tool_calls: Vec<LlmToolCall>,
    },
    Fail(String),
}

/// Mock LLM with an ordered script of replies.
///
/// An exhausted script is an `AgentError::Llm`, so tests fail loudly when a
/// phase makes more calls than expected.
#[derive(Default)]
pub struct MockLlm {
    script: Mutex<VecDeque<Scripted>>,
    invocations: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    /// Creates a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a text reply (builder).
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Reply {
            content: content.into(),
            tool_calls: vec![],
        });
        self
    }

    /// Queues a tool-calling reply (builder).
    pub fn reply_with_tool_calls(self, tool_calls: Vec<LlmToolCall>) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Reply {
            content: String::new(),
            tool_calls,
        });
        self
    }

    /// Queues a failure (builder).
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.into()));
        self
    }

    /// Messages of every request seen so far, in call order.
    pub fn invocations(&self) -> Vec<Vec<Message>> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of calls served (including failures).
    pub fn call_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    fn next(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
        self.invocations.lock().unwrap().push(messages.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply {
                content,
                tool_calls,
            }) => Ok(LlmResponse {
                content,
                tool_calls,
                usage: None,
            }),
            Some(Scripted::Fail(msg)) => Err(AgentError::Llm(msg)),
            None => Err(AgentError::Llm("mock script exhausted".into())),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
        self.next(messages)
    }

    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.next(messages)
    }

    async fn invoke_stream(
        &self,
        messages: &[Message],
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.next(messages)?;
        if let Some(tx) = chunk_tx {
            // Split on whitespace so streams carry more than one token.
            for piece in split_tokens(&response.content) {
                let _ = tx.send(piece).await;
            }
        }
        Ok(response)
    }
}

/// Splits content into whitespace-terminated tokens, keeping the separators.
fn split_tokens(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
