//! The five-phase orchestrator: understand → plan → execute → reflect → answer.
//!
//! One call to [`Orchestrator::run`] is one turn. Understand runs once; plan,
//! execute, and reflect loop until the reflection says the work suffices or
//! the iteration ceiling is hit; answer streams tokens to the caller and
//! appends the completed turn to the history strictly after the stream ends.
//! Dropping the stream cancels the turn; the history is then not touched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::context::{ContextPointer, ContextStore};
use crate::error::AgentError;
use crate::hash;
use crate::history::{format_for_planning, MessageHistory, Summarizer, TurnSelector};
use crate::llm::{parse_structured, Embedder, LlmClient};
use crate::message::Message;
use crate::tools::ToolRegistry;

use super::event::{AgentEvent, EventSink, Phase};
use super::normalize;
use super::prompt::{ANSWER_SYSTEM, PLAN_SYSTEM, REFLECT_SYSTEM, UNDERSTAND_SYSTEM};
use super::scheduler::TaskExecutor;
use super::state::{Plan, Reflection, TaskResult, Understanding};
use super::tool_exec::ToolExecutor;

/// Reasoning recorded when the iteration ceiling forces completion.
const MAX_ITERATIONS_REASONING: &str =
    "Reached maximum iterations; answering with the work gathered so far.";

/// Answer token stream handed to the caller. Finite, single-consumer,
/// non-restartable; it ends only after the turn has been recorded.
pub type AnswerStream = ReceiverStream<String>;

/// Drives one turn through the five phases.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    fast_llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    context: Arc<ContextStore>,
    config: AgentConfig,
    selector: TurnSelector,
    summarizer: Option<Summarizer>,
    events: EventSink,
}

impl Orchestrator {
    /// Builds an orchestrator. `llm` is the reasoning tier, `fast_llm` the
    /// small model for selection, relevance, and summaries. The turn selector
    /// defaults to LLM-judged over the configured window; summaries use the
    /// fast model only when the config enables it.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        fast_llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        context: Arc<ContextStore>,
        config: AgentConfig,
    ) -> Self {
        let selector = TurnSelector::LlmJudged {
            llm: fast_llm.clone(),
            window: config.max_context_messages,
        };
        let summarizer = config
            .summarize_via_llm
            .then(|| Summarizer::new(fast_llm.clone()));
        Self {
            llm,
            fast_llm,
            registry,
            context,
            config,
            selector,
            summarizer,
            events: EventSink::disabled(),
        }
    }

    /// Forwards agent events to the given channel (builder).
    pub fn with_events(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Switches turn selection to embedding similarity when the config asks
    /// for it; otherwise the embedder is ignored (builder).
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        if self.config.use_embeddings_for_selection {
            self.selector = TurnSelector::Embedding {
                embedder,
                top_k: self.config.max_context_messages,
            };
        }
        self
    }

    /// Overrides the turn selection strategy (builder).
    pub fn with_selector(mut self, selector: TurnSelector) -> Self {
        self.selector = selector;
        self
    }

    /// The context store this orchestrator writes through.
    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    /// Runs one turn. Returns the answer token stream once the Answer phase
    /// has been entered; phase-fatal errors surface here instead of a stream.
    /// The completed turn is appended to `history` after the stream finishes.
    pub async fn run(
        &self,
        query: &str,
        history: Arc<Mutex<MessageHistory>>,
    ) -> Result<AnswerStream, AgentError> {
        let query_id = hash::query_id(query);
        debug!(query_id = %query_id, "turn started");

        // Understand.
        self.events.emit(AgentEvent::PhaseStarted { phase: Phase::Understand });
        let conversation = {
            let mut guard = history.lock().await;
            if guard.has_messages() {
                let turns = guard.select_relevant(query, &self.selector).await;
                (!turns.is_empty()).then(|| format_for_planning(&turns))
            } else {
                None
            }
        };
        let understanding = self.understand(query, conversation.as_deref()).await?;
        self.events.emit(AgentEvent::UnderstandingReady {
            understanding: understanding.clone(),
        });
        self.events.emit(AgentEvent::PhaseCompleted { phase: Phase::Understand });

        // Plan → execute → reflect loop.
        let tool_exec = ToolExecutor::new(
            self.fast_llm.clone(),
            self.registry.clone(),
            self.context.clone(),
            self.events.clone(),
        );
        let executor = TaskExecutor::new(
            self.llm.clone(),
            tool_exec,
            self.context.clone(),
            self.events.clone(),
        );

        let mut completed_plans: Vec<Plan> = Vec::new();
        let mut task_results: BTreeMap<String, TaskResult> = BTreeMap::new();
        let mut guidance: Option<String> = None;
        let mut iteration = 1u32;

        loop {
            self.events.emit(AgentEvent::IterationStarted { iteration });

            self.events.emit(AgentEvent::PhaseStarted { phase: Phase::Plan });
            let mut plan = self
                .plan(
                    query,
                    &understanding,
                    &completed_plans,
                    &task_results,
                    guidance.as_deref(),
                    conversation.as_deref(),
                    iteration,
                )
                .await?;
            self.events.emit(AgentEvent::PlanCreated {
                iteration,
                summary: plan.summary.clone(),
                task_ids: plan.tasks.iter().map(|t| t.id.clone()).collect(),
            });
            self.events.emit(AgentEvent::PhaseCompleted { phase: Phase::Plan });

            self.events.emit(AgentEvent::PhaseStarted { phase: Phase::Execute });
            executor
                .run(&mut plan, &mut task_results, &understanding, &query_id)
                .await?;
            completed_plans.push(plan);
            self.events.emit(AgentEvent::PhaseCompleted { phase: Phase::Execute });

            self.events.emit(AgentEvent::PhaseStarted { phase: Phase::Reflect });
            let reflection = self
                .reflect(query, &completed_plans, &task_results, iteration)
                .await?;
            self.events.emit(AgentEvent::ReflectionReady {
                iteration,
                reflection: reflection.clone(),
            });
            self.events.emit(AgentEvent::PhaseCompleted { phase: Phase::Reflect });

            if reflection.is_complete {
                break;
            }
            guidance = Some(compose_guidance(&reflection));
            iteration += 1;
        }

        // Answer.
        self.events.emit(AgentEvent::PhaseStarted { phase: Phase::Answer });
        self.events.emit(AgentEvent::AnswerStarted);
        let messages = self.answer_messages(
            query,
            conversation.as_deref(),
            &completed_plans,
            &task_results,
            &query_id,
        );
        let stream = self.spawn_answer(query.to_string(), messages, history);
        self.events.emit(AgentEvent::AnswerStreamReady);
        Ok(stream)
    }

    async fn understand(
        &self,
        query: &str,
        conversation: Option<&str>,
    ) -> Result<Understanding, AgentError> {
        let mut user = String::new();
        if let Some(ctx) = conversation {
            user.push_str(&format!("Conversation so far:\n{}\n\n", ctx));
        }
        user.push_str(&format!("Query: {}", query));

        let messages = [Message::system(UNDERSTAND_SYSTEM), Message::user(user)];
        let response = self.llm.invoke(&messages).await?;
        let mut understanding: Understanding = parse_structured("understand", &response.content)?;
        normalize::apply(&mut understanding);
        Ok(understanding)
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan(
        &self,
        query: &str,
        understanding: &Understanding,
        completed_plans: &[Plan],
        task_results: &BTreeMap<String, TaskResult>,
        guidance: Option<&str>,
        conversation: Option<&str>,
        iteration: u32,
    ) -> Result<Plan, AgentError> {
        let mut user = format!("Query: {}\n", query);
        user.push_str(&format!(
            "Understanding: {}\n",
            serde_json::to_string(understanding).unwrap_or_default()
        ));
        if let Some(ctx) = conversation {
            user.push_str(&format!("\nConversation so far:\n{}\n", ctx));
        }
        if !completed_plans.is_empty() {
            user.push_str(&format!(
                "\nWork so far:\n{}\n",
                render_work(completed_plans, task_results)
            ));
        }
        if let Some(guidance) = guidance {
            user.push_str(&format!("\nReflection guidance:\n{}\n", guidance));
        }

        let messages = [Message::system(PLAN_SYSTEM), Message::user(user)];
        let response = self.llm.invoke(&messages).await?;
        let mut plan: Plan = parse_structured("plan", &response.content)?;
        plan.prefix_iteration(iteration);
        Ok(plan)
    }

    /// Reflect on the work so far. At or past the iteration ceiling this
    /// short-circuits to complete without any model call.
    async fn reflect(
        &self,
        query: &str,
        completed_plans: &[Plan],
        task_results: &BTreeMap<String, TaskResult>,
        iteration: u32,
    ) -> Result<Reflection, AgentError> {
        if iteration >= self.config.max_iterations {
            return Ok(Reflection {
                is_complete: true,
                reasoning: MAX_ITERATIONS_REASONING.to_string(),
                missing_info: vec![],
                suggested_next_steps: String::new(),
            });
        }

        let user = format!(
            "Query: {}\n\nWork so far:\n{}",
            query,
            render_work(completed_plans, task_results)
        );
        let messages = [Message::system(REFLECT_SYSTEM), Message::user(user)];
        let response = self.llm.invoke(&messages).await?;
        let reflection: Reflection = parse_structured("reflect", &response.content)?;
        Ok(reflection.normalized())
    }

    fn answer_messages(
        &self,
        query: &str,
        conversation: Option<&str>,
        completed_plans: &[Plan],
        task_results: &BTreeMap<String, TaskResult>,
        query_id: &str,
    ) -> Vec<Message> {
        let mut sections = Vec::new();
        if let Some(ctx) = conversation {
            sections.push(format!("Conversation so far:\n{}", ctx));
        }
        sections.push(format!(
            "Task outputs:\n{}",
            render_task_outputs(completed_plans, task_results)
        ));
        let sources = render_sources(&self.context.pointers_for(query_id));
        if !sources.is_empty() {
            sections.push(format!("Sources:\n{}", sources));
        }
        sections.push(format!("Question: {}", query));

        vec![
            Message::system(ANSWER_SYSTEM),
            Message::user(sections.join("\n\n")),
        ]
    }

    /// Streams the answer and, after the stream completes, records the turn.
    ///
    /// The returned channel closes only after the history append, so a caller
    /// that has drained the stream observes the updated history. A dropped
    /// receiver aborts the model call at its next suspension point and skips
    /// the append (a cancelled turn is not a completed turn).
    fn spawn_answer(
        &self,
        query: String,
        messages: Vec<Message>,
        history: Arc<Mutex<MessageHistory>>,
    ) -> AnswerStream {
        let (tx, rx) = mpsc::channel::<String>(64);
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
        let llm = self.llm.clone();
        let summarizer = self.summarizer.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let driver =
                tokio::spawn(async move { llm.invoke_stream(&messages, Some(chunk_tx)).await });

            let mut cancelled = false;
            while let Some(token) = chunk_rx.recv().await {
                if tx.send(token).await.is_err() {
                    cancelled = true;
                    break;
                }
            }
            if cancelled {
                driver.abort();
                debug!("answer stream cancelled by consumer, turn not recorded");
                return;
            }

            let answer = match driver.await {
                Ok(Ok(response)) => response.content,
                Ok(Err(e)) => {
                    warn!(error = %e, "answer model failed mid-stream, turn not recorded");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "answer task aborted, turn not recorded");
                    return;
                }
            };

            let summary = match &summarizer {
                Some(s) => s.summarize(&query, &answer).await,
                None => None,
            };
            let mut guard = history.lock().await;
            match guard.add_turn(query, answer.clone(), summary) {
                Ok(_) => {
                    events.emit(AgentEvent::AnswerCompleted { answer });
                    events.emit(AgentEvent::PhaseCompleted { phase: Phase::Answer });
                }
                Err(e) => warn!(error = %e, "turn not recorded"),
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Renders completed plans and their task outputs for plan/reflect prompts.
fn render_work(completed_plans: &[Plan], task_results: &BTreeMap<String, TaskResult>) -> String {
    let mut out = String::new();
    for (i, plan) in completed_plans.iter().enumerate() {
        out.push_str(&format!("Iteration {}: {}\n", i + 1, plan.summary));
        for task in &plan.tasks {
            out.push_str(&format!(
                "- [{}] {}: {}\n",
                task.status.as_str(),
                task.id,
                task.description
            ));
            if let Some(output) = task_results.get(&task.id).and_then(|r| r.output.as_deref()) {
                out.push_str(&format!("  Output: {}\n", output));
            }
        }
    }
    out
}

/// Flattens task results into the answer prompt's `Task: … Output: …` blocks.
fn render_task_outputs(
    completed_plans: &[Plan],
    task_results: &BTreeMap<String, TaskResult>,
) -> String {
    let mut blocks = Vec::new();
    for plan in completed_plans {
        for task in &plan.tasks {
            if let Some(output) = task_results.get(&task.id).and_then(|r| r.output.as_deref()) {
                blocks.push(format!("Task: {}\nOutput: {}", task.description, output));
            }
        }
    }
    blocks.join("\n\n")
}

/// Renders the Sources appendix input: every distinct description → urls
/// mapping that contributed, exactly once, in pointer order.
fn render_sources(pointers: &[ContextPointer]) -> String {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for pointer in pointers {
        if pointer.source_urls.is_empty() {
            continue;
        }
        match grouped
            .iter_mut()
            .find(|(desc, _)| desc == &pointer.tool_description)
        {
            Some((_, urls)) => {
                for url in &pointer.source_urls {
                    if !urls.contains(url) {
                        urls.push(url.clone());
                    }
                }
            }
            None => grouped.push((pointer.tool_description.clone(), pointer.source_urls.clone())),
        }
    }
    grouped
        .into_iter()
        .map(|(desc, urls)| format!("- {}: {}", desc, urls.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Guidance string for the next plan iteration.
fn compose_guidance(reflection: &Reflection) -> String {
    let mut parts = vec![reflection.reasoning.clone()];
    if !reflection.missing_info.is_empty() {
        parts.push(format!("Missing: {}", reflection.missing_info.join("; ")));
    }
    if !reflection.suggested_next_steps.is_empty() {
        parts.push(format!("Next steps: {}", reflection.suggested_next_steps));
    }
    parts.retain(|p| !p.trim().is_empty());
    parts.join("\n")
}
