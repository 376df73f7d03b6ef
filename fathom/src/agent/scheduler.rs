//! Dependency-scheduled task execution.
//!
//! Repeatedly computes the ready set (pending tasks whose dependencies are
//! all terminal) and dispatches it in parallel. `use_tools` tasks go through
//! the tool executor; `reason` tasks get the reasoning model with assembled
//! context. A failed task still unblocks its dependents, which then see its
//! failure marker. An empty ready set with unfinished tasks means a cycle or
//! starvation: the remainder is abandoned and reflection deals with the gap.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::context::ContextStore;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::message::Message;

use super::event::{AgentEvent, EventSink};
use super::prompt::REASON_SYSTEM;
use super::state::{Plan, Task, TaskResult, TaskStatus, TaskType, ToolCallStatus, Understanding};
use super::tool_exec::ToolExecutor;

/// Runs one plan's tasks with maximum safe parallelism.
pub struct TaskExecutor {
    llm: Arc<dyn LlmClient>,
    tool_exec: ToolExecutor,
    context: Arc<ContextStore>,
    events: EventSink,
}

impl TaskExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tool_exec: ToolExecutor,
        context: Arc<ContextStore>,
        events: EventSink,
    ) -> Self {
        Self {
            llm,
            tool_exec,
            context,
            events,
        }
    }

    /// Executes the plan, writing one [`TaskResult`] per dispatched task into
    /// `task_results` (which may already hold results from earlier
    /// iterations of the turn).
    pub async fn run(
        &self,
        plan: &mut Plan,
        task_results: &mut BTreeMap<String, TaskResult>,
        understanding: &Understanding,
        query_id: &str,
    ) -> Result<(), AgentError> {
        let mut terminal: HashSet<String> = HashSet::new();

        loop {
            let ready: HashSet<String> = plan
                .tasks
                .iter()
                .filter(|t| {
                    !terminal.contains(&t.id) && t.depends_on.iter().all(|d| terminal.contains(d))
                })
                .map(|t| t.id.clone())
                .collect();

            if ready.is_empty() {
                let unfinished = plan.tasks.len() - terminal.len();
                if unfinished > 0 {
                    warn!(
                        unfinished,
                        "no ready tasks while plan unfinished, abandoning remainder (dependency cycle?)"
                    );
                }
                return Ok(());
            }

            debug!(count = ready.len(), "dispatching ready set");
            // Results visible to this wave's reason tasks: everything that
            // finished before the wave, never a parallel sibling.
            let snapshot: Vec<TaskResult> = task_results.values().cloned().collect();

            let outcomes = join_all(
                plan.tasks
                    .iter_mut()
                    .filter(|t| ready.contains(&t.id))
                    .map(|task| self.run_task(task, &snapshot, understanding, query_id)),
            )
            .await;

            for outcome in outcomes {
                let result = outcome?;
                terminal.insert(result.task_id.clone());
                task_results.insert(result.task_id.clone(), result);
            }
        }
    }

    async fn run_task(
        &self,
        task: &mut Task,
        prior: &[TaskResult],
        understanding: &Understanding,
        query_id: &str,
    ) -> Result<TaskResult, AgentError> {
        task.status = TaskStatus::InProgress;
        self.events.emit(AgentEvent::TaskUpdate {
            task_id: task.id.clone(),
            status: TaskStatus::InProgress,
        });

        match task.task_type {
            TaskType::UseTools => Ok(self.run_tool_task(task, understanding, query_id).await),
            TaskType::Reason => self.run_reason_task(task, prior, query_id).await,
        }
    }

    /// Tool task: select calls, record them on the task, execute. Failure is
    /// contained: the task ends Failed with a marker naming the failed
    /// tools, and scheduling continues.
    async fn run_tool_task(
        &self,
        task: &mut Task,
        understanding: &Understanding,
        query_id: &str,
    ) -> TaskResult {
        task.tool_calls = self.tool_exec.select_calls(task, understanding).await;
        self.events.emit(AgentEvent::TaskToolCalls {
            task_id: task.id.clone(),
            calls: task.tool_calls.clone(),
        });

        let all_ok = if task.tool_calls.is_empty() {
            true
        } else {
            self.tool_exec
                .execute(&task.id, &mut task.tool_calls, query_id)
                .await
        };

        let output = if all_ok {
            let names: Vec<&str> = task.tool_calls.iter().map(|c| c.tool_name.as_str()).collect();
            task.status = TaskStatus::Completed;
            self.events.emit(AgentEvent::TaskUpdate {
                task_id: task.id.clone(),
                status: TaskStatus::Completed,
            });
            if names.is_empty() {
                "Data gathered: nothing (no tool calls needed)".to_string()
            } else {
                format!("Data gathered: {}", names.join(", "))
            }
        } else {
            let failed: Vec<&str> = task
                .tool_calls
                .iter()
                .filter(|c| c.status == ToolCallStatus::Failed)
                .map(|c| c.tool_name.as_str())
                .collect();
            task.status = TaskStatus::Failed;
            self.events.emit(AgentEvent::TaskUpdate {
                task_id: task.id.clone(),
                status: TaskStatus::Failed,
            });
            format!("Tool calls failed: {}", failed.join(", "))
        };

        TaskResult {
            task_id: task.id.clone(),
            output: Some(output),
        }
    }

    /// Reason task: reasoning model over prior task outputs plus every
    /// context record gathered for this query so far.
    async fn run_reason_task(
        &self,
        task: &mut Task,
        prior: &[TaskResult],
        query_id: &str,
    ) -> Result<TaskResult, AgentError> {
        let context_data = self.assemble_context(prior, query_id).await;
        let user = if context_data.is_empty() {
            format!("Task: {}\n\nNo data has been gathered yet.", task.description)
        } else {
            format!("Task: {}\n\nGathered data:\n{}", task.description, context_data)
        };
        let messages = [Message::system(REASON_SYSTEM), Message::user(user)];
        let response = self.llm.invoke(&messages).await?;

        task.status = TaskStatus::Completed;
        self.events.emit(AgentEvent::TaskUpdate {
            task_id: task.id.clone(),
            status: TaskStatus::Completed,
        });
        Ok(TaskResult {
            task_id: task.id.clone(),
            output: Some(response.content),
        })
    }

    /// Context for a reason task: textual outputs of previously completed
    /// tasks, then every loaded context record for the query rendered as
    /// `Data from <tool>(<args>) — source: …` plus the pretty result.
    async fn assemble_context(&self, prior: &[TaskResult], query_id: &str) -> String {
        let mut sections = Vec::new();
        for result in prior {
            if let Some(output) = &result.output {
                sections.push(format!("Task {}: {}", result.task_id, output));
            }
        }

        let pointers = self.context.pointers_for(query_id);
        let paths: Vec<_> = pointers.iter().map(|p| p.filepath.clone()).collect();
        for record in self.context.load(&paths).await {
            let source = if record.source_urls.is_empty() {
                String::new()
            } else {
                format!(" — source: {}", record.source_urls.join(", "))
            };
            let body = serde_json::to_string_pretty(&record.result)
                .unwrap_or_else(|_| record.result.to_string());
            sections.push(format!(
                "Data from {}({}){}\n{}",
                record.tool_name, record.args, source, body
            ));
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClient, LlmResponse, LlmToolCall};
    use crate::tools::{Tool, ToolError, ToolRegistry, ToolSpec};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Stub that answers by prompt content: tool-selection prompts get a call
    /// for the ticker named in the task, reason prompts get fixed text. Keeps
    /// parallel dispatch deterministic where a positional script would race.
    struct RouterLlm {
        reason_replies: Mutex<Vec<String>>,
        reason_prompts: Mutex<Vec<String>>,
    }

    impl RouterLlm {
        fn new(reason_replies: Vec<&str>) -> Self {
            Self {
                reason_replies: Mutex::new(reason_replies.iter().map(|s| s.to_string()).collect()),
                reason_prompts: Mutex::new(vec![]),
            }
        }
        fn reason_prompts(&self) -> Vec<String> {
            self.reason_prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for RouterLlm {
        async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, AgentError> {
            let user = messages.last().map(|m| m.content().to_string()).unwrap_or_default();
            self.reason_prompts.lock().unwrap().push(user);
            let mut replies = self.reason_replies.lock().unwrap();
            let content = if replies.is_empty() {
                "analysis".to_string()
            } else {
                replies.remove(0)
            };
            Ok(LlmResponse { content, tool_calls: vec![], usage: None })
        }

        async fn invoke_with_tools(
            &self,
            messages: &[Message],
            _tools: &[ToolSpec],
        ) -> Result<LlmResponse, AgentError> {
            let user = messages.last().map(Message::content).unwrap_or_default();
            // The task description names the ticker to fetch.
            let ticker = ["FAIL", "AAPL", "MSFT"]
                .iter()
                .find(|t| user.contains(**t))
                .copied()
                .unwrap_or("NONE");
            let tool_calls = if ticker == "NONE" {
                vec![]
            } else {
                vec![LlmToolCall {
                    name: "get_price".into(),
                    arguments: format!(r#"{{"ticker": "{}"}}"#, ticker),
                    id: None,
                }]
            };
            Ok(LlmResponse { content: String::new(), tool_calls, usage: None })
        }
    }

    struct PriceTool;

    #[async_trait]
    impl Tool for PriceTool {
        fn name(&self) -> &str {
            "get_price"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "get_price".into(),
                description: Some("latest price".into()),
                args_schema: json!({"type": "object"}),
            }
        }
        async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
            match args.get("ticker").and_then(Value::as_str) {
                Some("FAIL") => Err(ToolError::Invocation("upstream 500".into())),
                Some(t) => Ok(json!({"data": {"ticker": t, "price": 10.0}})),
                None => Err(ToolError::Invocation("missing ticker".into())),
            }
        }
    }

    fn executor(llm: Arc<RouterLlm>, dir: &std::path::Path) -> TaskExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PriceTool));
        let registry = Arc::new(registry);
        let context = Arc::new(ContextStore::new(dir));
        let tool_exec = ToolExecutor::new(
            llm.clone(),
            registry,
            context.clone(),
            EventSink::disabled(),
        );
        TaskExecutor::new(llm, tool_exec, context, EventSink::disabled())
    }

    fn task(id: &str, description: &str, task_type: TaskType, deps: &[&str]) -> Task {
        Task {
            id: id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            task_type,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            tool_calls: vec![],
        }
    }

    fn understanding() -> Understanding {
        Understanding { intent: "test".into(), entities: vec![] }
    }

    /// **Scenario**: A and B run before C; C's reason prompt carries A's
    /// failure marker and B's gathered data (dependency wait with one
    /// failing branch).
    #[tokio::test]
    async fn dependency_wait_with_failure() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RouterLlm::new(vec!["comparison done"]));
        let exec = executor(llm.clone(), dir.path());

        let mut plan = Plan {
            summary: "s".into(),
            tasks: vec![
                task("a", "fetch FAIL price", TaskType::UseTools, &[]),
                task("b", "fetch MSFT price", TaskType::UseTools, &[]),
                task("c", "compare results", TaskType::Reason, &["a", "b"]),
            ],
        };
        let mut results = BTreeMap::new();
        exec.run(&mut plan, &mut results, &understanding(), "q1").await.unwrap();

        assert_eq!(plan.task("a").unwrap().status, TaskStatus::Failed);
        assert_eq!(plan.task("b").unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.task("c").unwrap().status, TaskStatus::Completed);
        assert!(results["a"].output.as_ref().unwrap().contains("Tool calls failed: get_price"));
        assert!(results["b"].output.as_ref().unwrap().contains("Data gathered: get_price"));
        assert_eq!(results["c"].output.as_deref(), Some("comparison done"));

        let prompts = llm.reason_prompts();
        let c_prompt = prompts.last().unwrap();
        assert!(c_prompt.contains("Tool calls failed"), "sees A's failure marker");
        assert!(c_prompt.contains("MSFT"), "sees B's data");
        assert!(c_prompt.contains("Data from get_price"));
    }

    /// **Scenario**: A task whose selection returns no calls completes
    /// vacuously with a "nothing" marker.
    #[tokio::test]
    async fn empty_selection_is_vacuous_success() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(Arc::new(RouterLlm::new(vec![])), dir.path());
        let mut plan = Plan {
            summary: String::new(),
            tasks: vec![task("a", "no tickers here", TaskType::UseTools, &[])],
        };
        let mut results = BTreeMap::new();
        exec.run(&mut plan, &mut results, &understanding(), "q1").await.unwrap();
        assert_eq!(plan.task("a").unwrap().status, TaskStatus::Completed);
        assert!(results["a"].output.as_ref().unwrap().contains("nothing"));
    }

    /// **Scenario**: A cyclic component is never dispatched; the loop exits
    /// with those tasks still pending and acyclic tasks done.
    #[tokio::test]
    async fn cycle_is_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(Arc::new(RouterLlm::new(vec![])), dir.path());
        let mut plan = Plan {
            summary: String::new(),
            tasks: vec![
                task("x", "cycle left", TaskType::Reason, &["y"]),
                task("y", "cycle right", TaskType::Reason, &["x"]),
                task("free", "fetch AAPL price", TaskType::UseTools, &[]),
            ],
        };
        let mut results = BTreeMap::new();
        exec.run(&mut plan, &mut results, &understanding(), "q1").await.unwrap();

        assert_eq!(plan.task("free").unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.task("x").unwrap().status, TaskStatus::Pending);
        assert_eq!(plan.task("y").unwrap().status, TaskStatus::Pending);
        assert_eq!(results.len(), 1);
    }

    /// **Scenario**: A plan with zero tasks is a no-op.
    #[tokio::test]
    async fn empty_plan_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(Arc::new(RouterLlm::new(vec![])), dir.path());
        let mut plan = Plan { summary: String::new(), tasks: vec![] };
        let mut results = BTreeMap::new();
        exec.run(&mut plan, &mut results, &understanding(), "q1").await.unwrap();
        assert!(results.is_empty());
    }

    /// **Scenario**: Reason context includes results carried over from an
    /// earlier iteration of the same turn.
    #[tokio::test]
    async fn reason_sees_prior_iteration_results() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(RouterLlm::new(vec!["second analysis"]));
        let exec = executor(llm.clone(), dir.path());

        let mut results = BTreeMap::new();
        results.insert(
            "iter1_task_1".to_string(),
            TaskResult {
                task_id: "iter1_task_1".into(),
                output: Some("Data gathered: get_price".into()),
            },
        );
        let mut plan = Plan {
            summary: String::new(),
            tasks: vec![task("iter2_task_1", "summarize findings", TaskType::Reason, &[])],
        };
        exec.run(&mut plan, &mut results, &understanding(), "q1").await.unwrap();

        let prompts = llm.reason_prompts();
        assert!(prompts[0].contains("Task iter1_task_1"));
        assert_eq!(results.len(), 2);
    }
}
