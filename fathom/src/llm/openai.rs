//! OpenAI Chat Completions client implementing [`LlmClient`].
//!
//! Both model tiers use this client with different model names. Tool specs
//! are passed per call (`invoke_with_tools`) because tool selection happens
//! just in time, per task. Requires `OPENAI_API_KEY` unless a config is
//! supplied explicitly.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
        ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};

use crate::error::AgentError;
use crate::message::Message;
use crate::tools::ToolSpec;

use super::{LlmClient, LlmResponse, LlmToolCall, LlmUsage};

/// OpenAI-compatible chat client for one model.
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl ChatOpenAI {
    /// Builds a client with default config (API key from `OPENAI_API_KEY`).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Builds a client with explicit config (custom key or base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    /// Sets the sampling temperature (builder).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request_messages(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }

    fn request_tools(tools: &[ToolSpec]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: Some(t.args_schema.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<LlmResponse, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::request_messages(messages));
        if let Some(tools) = tools {
            if !tools.is_empty() {
                args.tools(Self::request_tools(tools));
            }
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| AgentError::Llm(format!("request build failed: {}", e)))?;

        debug!(
            model = %self.model,
            message_count = messages.len(),
            tools_count = tools.map(|t| t.len()).unwrap_or(0),
            "chat completion"
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Llm(format!("API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Llm("no choices in response".into()))?;

        let content = choice.message.content.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(LlmToolCall {
                    name: f.function.name,
                    arguments: f.function.arguments,
                    id: Some(f.id),
                }),
                _ => None,
            })
            .collect();

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
        self.complete(messages, None).await
    }

    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, AgentError> {
        self.complete(messages, Some(tools)).await
    }

    /// Streaming completion: each content delta goes through `chunk_tx`.
    ///
    /// Tool call deltas are accumulated by index and returned whole; some
    /// providers deliver content only in the final payload, in which case it
    /// is sent as one chunk at the end.
    async fn invoke_stream(
        &self,
        messages: &[Message],
        chunk_tx: Option<mpsc::Sender<String>>,
    ) -> Result<LlmResponse, AgentError> {
        let Some(chunk_tx) = chunk_tx else {
            return self.invoke(messages).await;
        };

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::request_messages(messages));
        args.stream(true);
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| AgentError::Llm(format!("request build failed: {}", e)))?;

        debug!(model = %self.model, message_count = messages.len(), "chat completion stream");

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AgentError::Llm(format!("stream error: {}", e)))?;

        let mut full_content = String::new();
        let mut sent_any = false;
        let mut tool_call_acc: std::collections::HashMap<u32, (String, String, String)> =
            std::collections::HashMap::new();
        let mut usage: Option<LlmUsage> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AgentError::Llm(format!("stream error: {}", e)))?;
            if let Some(ref u) = chunk.usage {
                usage = Some(LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                });
            }
            for choice in chunk.choices {
                if let Some(ref content) = choice.delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        sent_any = true;
                        let _ = chunk_tx.send(content.clone()).await;
                    }
                }
                if let Some(ref tool_calls) = choice.delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_acc.entry(tc.index).or_default();
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(ref func) = tc.function {
                            if let Some(ref name) = func.name {
                                entry.1.push_str(name);
                            }
                            if let Some(ref fragment) = func.arguments {
                                entry.2.push_str(fragment);
                            }
                        }
                    }
                }
            }
        }

        if !sent_any && !full_content.is_empty() {
            let _ = chunk_tx.send(full_content.clone()).await;
        }

        let mut tool_calls: Vec<LlmToolCall> = tool_call_acc
            .into_values()
            .map(|(id, name, arguments)| LlmToolCall {
                name,
                arguments,
                id: (!id.is_empty()).then_some(id),
            })
            .collect();
        tool_calls.sort_by(|a, b| a.name.cmp(&b.name));

        trace!(content_len = full_content.len(), tool_calls = tool_calls.len(), "stream done");

        Ok(LlmResponse {
            content: full_content,
            tool_calls,
            usage,
        })
    }
}
