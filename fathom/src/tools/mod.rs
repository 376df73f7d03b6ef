//! Tool registry: named, schema-typed callables the agent can invoke.
//!
//! Concrete tools (statements, prices, news, filings, web search, …) live
//! outside the core; the registry only knows names, arg schemas, and an
//! async invoke. A tool may return a bare JSON value or the envelope
//! `{"data": …, "source_urls": […]}`; unwrapping is the context store's
//! concern, not the registry's.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Error from looking up or invoking a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Name not present in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The tool ran and failed.
    #[error("tool invocation failed: {0}")]
    Invocation(String),
}

/// Specification of one tool, sent to the selection model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    /// Registry name, used for dispatch.
    pub name: String,
    /// Natural-language description for the selector.
    pub description: Option<String>,
    /// JSON Schema for the arguments object.
    pub args_schema: Value,
}

/// One callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Spec handed to the selection model.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool. The result is stored verbatim by the context store.
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

/// Name → tool map. Dispatch is by string lookup; no class hierarchy.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool; a tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks a tool up by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Specs of all registered tools, sorted by name for stable prompts.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
