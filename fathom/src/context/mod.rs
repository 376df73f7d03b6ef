//! Content-addressed context store for tool-call results.
//!
//! Every tool invocation is persisted as one JSON record on disk; an
//! in-memory pointer index per query keeps the handles. Filenames are a pure
//! function of `(tool_name, canonical args)`, so re-running an identical call
//! overwrites the same file. Reason tasks and the answer phase later load a
//! relevance-filtered subset back into their prompts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::{parse_structured, LlmClient};
use crate::message::Message;

/// Hex length of the content hash in filenames.
const FILENAME_HASH_LEN: usize = 12;

/// System prompt for pointer relevance selection.
const RELEVANCE_SYSTEM: &str = r#"You decide which stored tool results are relevant to a query.

You receive a query and a numbered list of stored results (tool name, description, arguments). Respond with JSON only, no extra text:
{"relevant_ids": [0, 2]}

Include an id only when that result's data would help answer the query. An empty list is a valid answer."#;

/// In-memory handle to one record on disk, scoped by query id.
#[derive(Debug, Clone)]
pub struct ContextPointer {
    /// Full path of the record file.
    pub filepath: PathBuf,
    /// Tool that produced the record.
    pub tool_name: String,
    /// One-line human synthesis of name + args, used for relevance selection.
    pub tool_description: String,
    /// Arguments the tool was called with.
    pub args: Value,
    /// Query namespace the record belongs to.
    pub query_id: String,
    /// Source URLs extracted from the result envelope, kept for citation.
    pub source_urls: Vec<String>,
    /// Task that issued the call, when known.
    pub task_id: Option<String>,
}

/// On-disk record: the full tool result plus provenance.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContextRecord {
    pub tool_name: String,
    pub tool_description: String,
    pub args: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
    pub result: Value,
}

/// Content-addressed store rooted at one directory.
///
/// The pointer index is a per-instance `DashMap` because parallel tool calls
/// within a task append concurrently; the files themselves are shared
/// read-only by every later load.
pub struct ContextStore {
    root: PathBuf,
    pointers: DashMap<String, Vec<ContextPointer>>,
}

impl ContextStore {
    /// Creates a store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pointers: DashMap::new(),
        }
    }

    /// The store's on-disk root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists one tool result and indexes a pointer for `query_id`.
    ///
    /// The envelope `{"data": …, "source_urls": […]}` is unwrapped: `data`
    /// becomes the stored result and the urls move onto the pointer (and the
    /// record). A repeat save of the same `(tool_name, args)` overwrites the
    /// file and replaces the existing pointer instead of appending a second.
    /// Disk failure is fatal for the caller.
    pub async fn save(
        &self,
        tool_name: &str,
        args: &Value,
        result: Value,
        query_id: &str,
        task_id: Option<&str>,
    ) -> Result<ContextPointer, AgentError> {
        let (result, source_urls) = unwrap_envelope(result);
        let description = describe(tool_name, args);
        let filepath = self.root.join(filename(tool_name, args));

        let record = ContextRecord {
            tool_name: tool_name.to_string(),
            tool_description: description.clone(),
            args: args.clone(),
            timestamp: Utc::now(),
            task_id: task_id.map(str::to_string),
            query_id: Some(query_id.to_string()),
            source_urls: source_urls.clone(),
            result,
        };

        tokio::fs::create_dir_all(&self.root).await?;
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| AgentError::malformed("context-save", e.to_string()))?;
        tokio::fs::write(&filepath, body).await?;
        debug!(tool = tool_name, file = %filepath.display(), "context record saved");

        let pointer = ContextPointer {
            filepath: filepath.clone(),
            tool_name: tool_name.to_string(),
            tool_description: description,
            args: args.clone(),
            query_id: query_id.to_string(),
            source_urls,
            task_id: task_id.map(str::to_string),
        };

        let mut entry = self.pointers.entry(query_id.to_string()).or_default();
        match entry.iter_mut().find(|p| p.filepath == filepath) {
            Some(existing) => *existing = pointer.clone(),
            None => entry.push(pointer.clone()),
        }
        Ok(pointer)
    }

    /// Pointers recorded for the query, in insertion order.
    pub fn pointers_for(&self, query_id: &str) -> Vec<ContextPointer> {
        self.pointers
            .get(query_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Loads records for the given paths. A file that is missing or does not
    /// parse is skipped with a warning; the agent tolerates a partial context.
    pub async fn load(&self, filepaths: &[PathBuf]) -> Vec<ContextRecord> {
        let mut records = Vec::with_capacity(filepaths.len());
        for path in filepaths {
            match tokio::fs::read(path).await {
                Ok(bytes) => match serde_json::from_slice::<ContextRecord>(&bytes) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(file = %path.display(), error = %e, "skipping unparseable context record"),
                },
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable context record"),
            }
        }
        records
    }

    /// Asks the fast model which pointers matter for `query`.
    ///
    /// Returns the selected filepaths. An empty selection is respected (no
    /// irrelevant data is injected); an LLM or parse failure falls back to
    /// all pointers.
    pub async fn select_relevant(
        &self,
        llm: &dyn LlmClient,
        query: &str,
        pointers: &[ContextPointer],
    ) -> Vec<PathBuf> {
        if pointers.is_empty() {
            return vec![];
        }

        let mut listing = String::new();
        for (i, p) in pointers.iter().enumerate() {
            listing.push_str(&format!(
                "{}. tool={} description={} args={}\n",
                i, p.tool_name, p.tool_description, p.args
            ));
        }
        let user = format!("Query: {}\n\nStored results:\n{}", query, listing);
        let messages = [Message::system(RELEVANCE_SYSTEM), Message::user(user)];

        #[derive(serde::Deserialize)]
        struct Selection {
            relevant_ids: Vec<usize>,
        }

        let selection = match llm.invoke(&messages).await {
            Ok(resp) => parse_structured::<Selection>("context-relevance", &resp.content),
            Err(e) => Err(e),
        };

        match selection {
            Ok(sel) => sel
                .relevant_ids
                .into_iter()
                .filter_map(|i| pointers.get(i).map(|p| p.filepath.clone()))
                .collect(),
            Err(e) => {
                warn!(error = %e, "context relevance selection failed, using all pointers");
                pointers.iter().map(|p| p.filepath.clone()).collect()
            }
        }
    }
}

/// Recursively rewrites objects into key-sorted form so serialization is
/// canonical regardless of how the args were built.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            serde_json::to_value(sorted).unwrap_or_else(|_| value.clone())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Deterministic record filename: optional ticker prefix, tool name, and the
/// first 12 hex of SHA-256 over tool name + canonical args.
pub fn filename(tool_name: &str, args: &Value) -> String {
    let canonical = canonicalize(args).to_string();
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let hash = &digest[..FILENAME_HASH_LEN];

    match ticker_of(args) {
        Some(ticker) => format!("{}_{}_{}.json", ticker, tool_name, hash),
        None => format!("{}_{}.json", tool_name, hash),
    }
}

/// Uppercased ticker from the args, when present and filename-safe.
fn ticker_of(args: &Value) -> Option<String> {
    let raw = args.get("ticker").or_else(|| args.get("symbol"))?.as_str()?;
    let ticker: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    (!ticker.is_empty()).then_some(ticker)
}

/// Human-readable one-line synthesis of a call, e.g.
/// `AAPL income statements (annual) - 5 periods`.
pub fn describe(tool_name: &str, args: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(ticker) = ticker_of(args) {
        parts.push(ticker);
    }
    parts.push(tool_name.replace('_', " "));
    if let Some(period) = args.get("period").and_then(Value::as_str) {
        parts.push(format!("({})", period));
    }
    if let Some(query) = args.get("query").and_then(Value::as_str) {
        parts.push(format!("\"{}\"", query));
    }
    if let Some(limit) = args.get("limit").and_then(Value::as_u64) {
        parts.push(format!("- {} periods", limit));
    }
    parts.join(" ")
}

/// Splits a tool result into `(result, source_urls)`, unwrapping the
/// `{"data": …, "source_urls": […]}` envelope when present.
fn unwrap_envelope(result: Value) -> (Value, Vec<String>) {
    let Value::Object(mut map) = result else {
        return (result, vec![]);
    };
    if !map.contains_key("data") {
        return (Value::Object(map), vec![]);
    }
    let data = map.remove("data").unwrap_or(Value::Null);
    let urls = map
        .remove("source_urls")
        .and_then(|v| match v {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();
    (data, urls)
}
