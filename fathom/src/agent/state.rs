//! Turn-scoped state: understanding, plans, tasks, tool calls, reflection.
//!
//! These types are also the declared shapes of the structured LLM outputs:
//! Understand parses into [`Understanding`], Plan into [`Plan`], Reflect into
//! [`Reflection`]. Serde defaults keep the runtime-only fields (statuses,
//! tool calls) out of the model's contract.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Ticker,
    Date,
    Metric,
    Company,
    Period,
    #[serde(other)]
    Other,
}

/// One entity extracted by Understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
}

/// Structured understanding of the query; immutable after the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Understanding {
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Understanding {
    /// Values of all entities of one kind.
    pub fn values_of(&self, kind: EntityKind) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.value.as_str())
            .collect()
    }
}

/// Task flavour: gather data with tools, or reason over gathered data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    UseTools,
    Reason,
}

/// Task lifecycle; transitions are monotonic
/// (pending → in_progress → completed | failed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Lifecycle of one tool call within a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// One selected tool invocation. `tool_name` must exist in the registry at
/// execution time; an unknown name fails the call, not the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub args: Value,
    #[serde(default)]
    pub status: ToolCallStatus,
}

/// One planned task. `tool_calls` stays empty until the tool executor has
/// selected calls for a `use_tools` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub task_type: TaskType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// One plan iteration: a summary and a task DAG expressed through
/// `depends_on` ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Plan {
    /// Prefixes every task id (and dependency reference) with `iter<N>_` so
    /// ids never collide across iterations of the same turn. Dependency
    /// references that do not resolve within this plan are dropped.
    pub fn prefix_iteration(&mut self, iteration: u32) {
        let prefix = format!("iter{}_", iteration);
        let known: HashSet<String> = self.tasks.iter().map(|t| t.id.clone()).collect();
        for task in &mut self.tasks {
            task.depends_on = task
                .depends_on
                .iter()
                .filter(|d| known.contains(*d))
                .map(|d| format!("{}{}", prefix, d))
                .collect();
            task.id = format!("{}{}", prefix, task.id);
        }
    }

    /// Task lookup by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Output of one executed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// "Data gathered: …" marker for tool tasks, model text for reason tasks.
    pub output: Option<String>,
}

/// Reflection verdict after an iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub is_complete: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub suggested_next_steps: String,
}

impl Reflection {
    /// Restores the invariant `is_complete ⇒ missing_info = [] ∧ next steps = ""`
    /// on whatever the model returned.
    pub fn normalized(mut self) -> Self {
        if self.is_complete {
            self.missing_info.clear();
            self.suggested_next_steps.clear();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A planner payload deserializes with defaulted statuses.
    #[test]
    fn plan_deserializes_from_llm_shape() {
        let raw = r#"{
            "summary": "gather then compare",
            "tasks": [
                {"id": "task_1", "description": "fetch AAPL income statements", "task_type": "use_tools", "depends_on": []},
                {"id": "task_2", "description": "compare margins", "task_type": "reason", "depends_on": ["task_1"]}
            ]
        }"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].status, TaskStatus::Pending);
        assert_eq!(plan.tasks[1].task_type, TaskType::Reason);
        assert!(plan.tasks[0].tool_calls.is_empty());
    }

    /// **Scenario**: Prefixing rewrites ids and dependencies and drops
    /// references to tasks outside the plan.
    #[test]
    fn prefix_iteration_rewrites_ids() {
        let mut plan = Plan {
            summary: String::new(),
            tasks: vec![
                Task {
                    id: "task_1".into(),
                    description: "a".into(),
                    status: TaskStatus::Pending,
                    task_type: TaskType::UseTools,
                    depends_on: vec![],
                    tool_calls: vec![],
                },
                Task {
                    id: "task_2".into(),
                    description: "b".into(),
                    status: TaskStatus::Pending,
                    task_type: TaskType::Reason,
                    depends_on: vec!["task_1".into(), "ghost".into()],
                    tool_calls: vec![],
                },
            ],
        };
        plan.prefix_iteration(2);
        assert_eq!(plan.tasks[0].id, "iter2_task_1");
        assert_eq!(plan.tasks[1].id, "iter2_task_2");
        assert_eq!(plan.tasks[1].depends_on, ["iter2_task_1"]);
    }

    /// **Scenario**: Entity kinds parse from their lowercase wire names and
    /// unknown kinds land on Other.
    #[test]
    fn entity_kind_wire_names() {
        let e: Entity = serde_json::from_str(r#"{"type": "ticker", "value": "AAPL"}"#).unwrap();
        assert_eq!(e.kind, EntityKind::Ticker);
        let e: Entity = serde_json::from_str(r#"{"type": "currency_pair", "value": "EUR/USD"}"#).unwrap();
        assert_eq!(e.kind, EntityKind::Other);
    }

    /// **Scenario**: normalized() empties the gap fields when complete.
    #[test]
    fn reflection_normalized() {
        let r = Reflection {
            is_complete: true,
            reasoning: "done".into(),
            missing_info: vec!["noise".into()],
            suggested_next_steps: "noise".into(),
        }
        .normalized();
        assert!(r.missing_info.is_empty());
        assert!(r.suggested_next_steps.is_empty());
    }

    /// **Scenario**: values_of filters entities by kind.
    #[test]
    fn understanding_values_of() {
        let u = Understanding {
            intent: "compare margins".into(),
            entities: vec![
                Entity { kind: EntityKind::Ticker, value: "AAPL".into() },
                Entity { kind: EntityKind::Period, value: "annual".into() },
                Entity { kind: EntityKind::Ticker, value: "MSFT".into() },
            ],
        };
        assert_eq!(u.values_of(EntityKind::Ticker), ["AAPL", "MSFT"]);
        assert_eq!(u.values_of(EntityKind::Period), ["annual"]);
    }
}
