//! Observable events for every phase, task, and tool-call transition.
//!
//! The orchestrator emits these through an optional bounded channel. Emission
//! is fire-and-forget: a missing consumer, a full queue, or a closed channel
//! never affects the turn.

use serde_json::Value;
use tokio::sync::mpsc;

use super::state::{Reflection, TaskStatus, ToolCall, ToolCallStatus, Understanding};

/// The five phases of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Understand,
    Plan,
    Execute,
    Reflect,
    Answer,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Understand => "understand",
            Phase::Plan => "plan",
            Phase::Execute => "execute",
            Phase::Reflect => "reflect",
            Phase::Answer => "answer",
        };
        f.write_str(name)
    }
}

/// One observable agent event.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    PhaseStarted {
        phase: Phase,
    },
    PhaseCompleted {
        phase: Phase,
    },
    IterationStarted {
        iteration: u32,
    },
    UnderstandingReady {
        understanding: Understanding,
    },
    PlanCreated {
        iteration: u32,
        summary: String,
        task_ids: Vec<String>,
    },
    TaskUpdate {
        task_id: String,
        status: TaskStatus,
    },
    TaskToolCalls {
        task_id: String,
        calls: Vec<ToolCall>,
    },
    ToolCallUpdate {
        task_id: String,
        tool_name: String,
        status: ToolCallStatus,
    },
    ToolCallFailed {
        task_id: String,
        tool_name: String,
        args: Value,
        message: String,
    },
    ReflectionReady {
        iteration: u32,
        reflection: Reflection,
    },
    AnswerStarted,
    AnswerStreamReady,
    AnswerCompleted {
        answer: String,
    },
}

/// Fire-and-forget event sender shared by the orchestrator and executors.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    /// A sink that forwards to the given channel.
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits without blocking; a full or closed channel is ignored.
    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Events arrive in emission order through the channel.
    #[tokio::test]
    async fn emits_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx);
        sink.emit(AgentEvent::PhaseStarted { phase: Phase::Understand });
        sink.emit(AgentEvent::IterationStarted { iteration: 1 });

        assert!(matches!(
            rx.recv().await,
            Some(AgentEvent::PhaseStarted { phase: Phase::Understand })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(AgentEvent::IterationStarted { iteration: 1 })
        ));
    }

    /// **Scenario**: A dropped receiver or a full queue never errors.
    #[tokio::test]
    async fn emit_never_fails() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = EventSink::new(tx);
        sink.emit(AgentEvent::AnswerStarted);

        let sink = EventSink::disabled();
        sink.emit(AgentEvent::AnswerStarted);
    }

    /// **Scenario**: Phase Display names match the wire names.
    #[test]
    fn phase_display() {
        assert_eq!(Phase::Understand.to_string(), "understand");
        assert_eq!(Phase::Answer.to_string(), "answer");
    }
}
