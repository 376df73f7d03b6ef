//! Tool executor: just-in-time tool selection and concurrent invocation.
//!
//! For a `use_tools` task the fast model picks concrete calls in tool-calling
//! mode; the calls run concurrently, each result lands in the context store
//! under the turn's query id. A failed call never aborts its siblings; the
//! task reports which tools failed.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::ContextStore;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::tools::ToolRegistry;

use super::event::{AgentEvent, EventSink};
use super::prompt::TOOL_SELECT_SYSTEM;
use super::state::{EntityKind, Task, ToolCall, ToolCallStatus, Understanding};

/// Selects and runs tool calls for one task.
pub struct ToolExecutor {
    fast_llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    context: Arc<ContextStore>,
    events: EventSink,
}

impl ToolExecutor {
    pub fn new(
        fast_llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        context: Arc<ContextStore>,
        events: EventSink,
    ) -> Self {
        Self {
            fast_llm,
            registry,
            context,
            events,
        }
    }

    /// Asks the fast model which tools to call for the task.
    ///
    /// The prompt enumerates every registered tool; the user message carries
    /// the task description plus the normalised tickers and periods from the
    /// understanding so the selector does not re-guess the subjects. An empty
    /// selection is valid (the task is vacuously satisfied), and so is a
    /// selector failure; reflection notices the gap.
    pub async fn select_calls(&self, task: &Task, understanding: &Understanding) -> Vec<ToolCall> {
        let specs = self.registry.specs();
        if specs.is_empty() {
            return vec![];
        }

        let mut user = format!("Task: {}", task.description);
        let tickers = understanding.values_of(EntityKind::Ticker);
        if !tickers.is_empty() {
            user.push_str(&format!("\nTickers: {}", tickers.join(", ")));
        }
        let periods = understanding.values_of(EntityKind::Period);
        if !periods.is_empty() {
            user.push_str(&format!("\nPeriods: {}", periods.join(", ")));
        }
        let messages = [Message::system(TOOL_SELECT_SYSTEM), Message::user(user)];

        match self.fast_llm.invoke_with_tools(&messages, &specs).await {
            Ok(resp) => resp
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    tool_name: tc.name,
                    args: parse_call_args(&tc.arguments),
                    status: ToolCallStatus::Pending,
                })
                .collect(),
            Err(e) => {
                warn!(task = %task.id, error = %e, "tool selection failed, treating task as vacuous");
                vec![]
            }
        }
    }

    /// Runs all calls concurrently, persisting each success through the
    /// context store. Returns true when every call succeeded.
    pub async fn execute(&self, task_id: &str, calls: &mut [ToolCall], query_id: &str) -> bool {
        let outcomes = join_all(
            calls
                .iter_mut()
                .map(|call| self.run_one(task_id, call, query_id)),
        )
        .await;
        outcomes.into_iter().all(|ok| ok)
    }

    async fn run_one(&self, task_id: &str, call: &mut ToolCall, query_id: &str) -> bool {
        call.status = ToolCallStatus::Running;
        self.events.emit(AgentEvent::ToolCallUpdate {
            task_id: task_id.to_string(),
            tool_name: call.tool_name.clone(),
            status: ToolCallStatus::Running,
        });

        let outcome = match self.registry.get(&call.tool_name) {
            None => Err(format!("unknown tool: {}", call.tool_name)),
            Some(tool) => match tool.invoke(call.args.clone()).await {
                Ok(result) => self
                    .context
                    .save(&call.tool_name, &call.args, result, query_id, Some(task_id))
                    .await
                    .map(|_| ())
                    .map_err(|e| format!("context save failed: {}", e)),
                Err(e) => Err(e.to_string()),
            },
        };

        match outcome {
            Ok(()) => {
                debug!(task = task_id, tool = %call.tool_name, "tool call completed");
                call.status = ToolCallStatus::Completed;
                self.events.emit(AgentEvent::ToolCallUpdate {
                    task_id: task_id.to_string(),
                    tool_name: call.tool_name.clone(),
                    status: ToolCallStatus::Completed,
                });
                true
            }
            Err(message) => {
                warn!(task = task_id, tool = %call.tool_name, error = %message, "tool call failed");
                call.status = ToolCallStatus::Failed;
                self.events.emit(AgentEvent::ToolCallUpdate {
                    task_id: task_id.to_string(),
                    tool_name: call.tool_name.clone(),
                    status: ToolCallStatus::Failed,
                });
                self.events.emit(AgentEvent::ToolCallFailed {
                    task_id: task_id.to_string(),
                    tool_name: call.tool_name.clone(),
                    args: call.args.clone(),
                    message,
                });
                false
            }
        }
    }
}

/// Parses a tool-calling arguments string; malformed JSON becomes `{}` with a
/// warning rather than a failed call.
fn parse_call_args(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, arguments, "tool arguments did not parse, using empty object");
            serde_json::json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmToolCall, MockLlm};
    use crate::tools::{Tool, ToolError, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct PriceTool;

    #[async_trait]
    impl Tool for PriceTool {
        fn name(&self) -> &str {
            "get_price"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "get_price".into(),
                description: Some("latest price for a ticker".into()),
                args_schema: json!({"type": "object", "properties": {"ticker": {"type": "string"}}}),
            }
        }
        async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
            match args.get("ticker").and_then(Value::as_str) {
                Some("FAIL") => Err(ToolError::Invocation("upstream 500".into())),
                Some(t) => Ok(json!({"data": {"ticker": t, "price": 100.0}, "source_urls": ["https://prices.example/quote"]})),
                None => Err(ToolError::Invocation("missing ticker".into())),
            }
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(PriceTool));
        Arc::new(r)
    }

    fn task(id: &str) -> Task {
        Task {
            id: id.into(),
            description: "fetch latest prices".into(),
            status: Default::default(),
            task_type: super::super::state::TaskType::UseTools,
            depends_on: vec![],
            tool_calls: vec![],
        }
    }

    fn understanding() -> Understanding {
        serde_json::from_str(
            r#"{"intent": "price check", "entities": [{"type": "ticker", "value": "AAPL"}]}"#,
        )
        .unwrap()
    }

    /// **Scenario**: Selection maps the model's tool calls to pending calls
    /// and the user prompt names the normalised tickers.
    #[tokio::test]
    async fn select_calls_maps_model_output() {
        let llm = Arc::new(MockLlm::new().reply_with_tool_calls(vec![LlmToolCall {
            name: "get_price".into(),
            arguments: r#"{"ticker": "AAPL"}"#.into(),
            id: Some("c1".into()),
        }]));
        let dir = tempfile::tempdir().unwrap();
        let exec = ToolExecutor::new(
            llm.clone(),
            registry(),
            Arc::new(ContextStore::new(dir.path())),
            EventSink::disabled(),
        );

        let calls = exec.select_calls(&task("t1"), &understanding()).await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "get_price");
        assert_eq!(calls[0].args["ticker"], "AAPL");
        assert_eq!(calls[0].status, ToolCallStatus::Pending);

        let prompt = &llm.invocations()[0];
        assert!(prompt[1].content().contains("Tickers: AAPL"));
    }

    /// **Scenario**: Selector failure and empty registry both yield an empty
    /// (vacuously successful) selection.
    #[tokio::test]
    async fn select_calls_vacuous_cases() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ToolExecutor::new(
            Arc::new(MockLlm::new().fail("selector down")),
            registry(),
            Arc::new(ContextStore::new(dir.path())),
            EventSink::disabled(),
        );
        assert!(exec.select_calls(&task("t1"), &understanding()).await.is_empty());

        let exec = ToolExecutor::new(
            Arc::new(MockLlm::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(ContextStore::new(dir.path())),
            EventSink::disabled(),
        );
        assert!(exec.select_calls(&task("t1"), &understanding()).await.is_empty());
    }

    /// **Scenario**: Successful calls persist records under the query id and
    /// end Completed; execute() reports all-succeeded.
    #[tokio::test]
    async fn execute_persists_results() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(ContextStore::new(dir.path()));
        let exec = ToolExecutor::new(
            Arc::new(MockLlm::new()),
            registry(),
            context.clone(),
            EventSink::disabled(),
        );
        let mut calls = vec![ToolCall {
            tool_name: "get_price".into(),
            args: json!({"ticker": "AAPL"}),
            status: ToolCallStatus::Pending,
        }];

        assert!(exec.execute("t1", &mut calls, "q1").await);
        assert_eq!(calls[0].status, ToolCallStatus::Completed);
        let pointers = context.pointers_for("q1");
        assert_eq!(pointers.len(), 1);
        assert_eq!(pointers[0].task_id.as_deref(), Some("t1"));
        assert_eq!(pointers[0].source_urls, ["https://prices.example/quote"]);
    }

    /// **Scenario**: One failing call does not abort its sibling; the error
    /// callback fires and all-succeeded is false.
    #[tokio::test]
    async fn execute_contains_failures() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(ContextStore::new(dir.path()));
        let (tx, mut rx) = mpsc::channel(32);
        let exec = ToolExecutor::new(
            Arc::new(MockLlm::new()),
            registry(),
            context.clone(),
            EventSink::new(tx),
        );
        let mut calls = vec![
            ToolCall {
                tool_name: "get_price".into(),
                args: json!({"ticker": "FAIL"}),
                status: ToolCallStatus::Pending,
            },
            ToolCall {
                tool_name: "get_price".into(),
                args: json!({"ticker": "MSFT"}),
                status: ToolCallStatus::Pending,
            },
        ];

        assert!(!exec.execute("t1", &mut calls, "q1").await);
        assert_eq!(calls[0].status, ToolCallStatus::Failed);
        assert_eq!(calls[1].status, ToolCallStatus::Completed);
        assert_eq!(context.pointers_for("q1").len(), 1);

        let mut saw_error = false;
        while let Ok(ev) = rx.try_recv() {
            if let AgentEvent::ToolCallFailed { tool_name, message, .. } = ev {
                saw_error = true;
                assert_eq!(tool_name, "get_price");
                assert!(message.contains("upstream 500"));
            }
        }
        assert!(saw_error);
    }

    /// **Scenario**: An unknown tool name fails that call only.
    #[tokio::test]
    async fn unknown_tool_fails_call() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ToolExecutor::new(
            Arc::new(MockLlm::new()),
            registry(),
            Arc::new(ContextStore::new(dir.path())),
            EventSink::disabled(),
        );
        let mut calls = vec![ToolCall {
            tool_name: "no_such_tool".into(),
            args: json!({}),
            status: ToolCallStatus::Pending,
        }];
        assert!(!exec.execute("t1", &mut calls, "q1").await);
        assert_eq!(calls[0].status, ToolCallStatus::Failed);
    }

    /// **Scenario**: Malformed argument JSON from the selector becomes `{}`.
    #[test]
    fn bad_args_become_empty_object() {
        assert_eq!(parse_call_args("not json"), json!({}));
        assert_eq!(parse_call_args(""), json!({}));
        assert_eq!(parse_call_args(r#"{"a": 1}"#), json!({"a": 1}));
    }
}
