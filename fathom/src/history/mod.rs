//! Per-session conversation history: completed turns plus relevance selection.
//!
//! A turn is one (query, answer, summary) triple with a dense id. The history
//! participates in every phase: Understand and Plan see a lightweight
//! rendering built from summaries, Answer sees full answers. Which prior
//! turns are injected is decided by a [`TurnSelector`]: LLM-judged (with a
//! per-query cache), recency window, or embedding similarity.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::AgentError;
use crate::hash::short_hash;
use crate::llm::{cosine_similarity, parse_structured, Embedder, LlmClient};
use crate::message::Message;

/// Max query/answer chars used in the deterministic preview summary.
const PREVIEW_QUERY_CHARS: usize = 60;
const PREVIEW_ANSWER_CHARS: usize = 100;

/// System prompt for judged relevance over prior turns.
const TURN_RELEVANCE_SYSTEM: &str = r#"You decide which earlier conversation turns are relevant to a new query.

You receive the new query and a numbered list of prior turns (id, user query, answer summary). Respond with JSON only, no extra text:
{"message_ids": [0, 2]}

Include an id only when that turn provides context the new query depends on (follow-ups, pronouns, references to earlier subjects). An empty list is a valid answer."#;

/// System prompt for one- to two-sentence turn summaries.
const TURN_SUMMARY_SYSTEM: &str = "Summarize the following exchange in one or two sentences. \
Mention the subject (e.g. ticker, currency pair, metric) so the summary is useful as \
retrieval context later. Respond with the summary text only.";

/// One completed (query, answer) exchange.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    /// Dense per-history id, starting at 0.
    pub id: u64,
    pub query: String,
    pub answer: String,
    /// Never empty: LLM-produced or the deterministic preview.
    pub summary: String,
}

/// Ordered log of turns within one session.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MessageHistory {
    turns: Vec<Turn>,
    next_id: u64,
    /// Per-query relevance results, keyed by a short query hash.
    /// Invalidated by `add_turn` and `clear`; never persisted.
    #[serde(skip)]
    relevance_cache: HashMap<String, Vec<u64>>,
}

impl MessageHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed turn.
    ///
    /// Query and answer must be non-empty. When `summary` is absent or empty
    /// the deterministic preview is stored instead, so a summary is always
    /// present. Any cached relevance results are invalidated.
    pub fn add_turn(
        &mut self,
        query: impl Into<String>,
        answer: impl Into<String>,
        summary: Option<String>,
    ) -> Result<&Turn, AgentError> {
        let query = query.into();
        let answer = answer.into();
        if query.trim().is_empty() {
            return Err(AgentError::InvalidTurn("query must not be empty".into()));
        }
        if answer.trim().is_empty() {
            return Err(AgentError::InvalidTurn("answer must not be empty".into()));
        }

        let summary = match summary {
            Some(s) if !s.trim().is_empty() => s,
            _ => preview_summary(&query, &answer),
        };

        let turn = Turn {
            id: self.next_id,
            query,
            answer,
            summary,
        };
        self.next_id += 1;
        self.relevance_cache.clear();
        self.turns.push(turn);
        Ok(self.turns.last().expect("just pushed"))
    }

    /// True when at least one turn is recorded.
    pub fn has_messages(&self) -> bool {
        !self.turns.is_empty()
    }

    /// Number of recorded turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when no turns are recorded.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// All turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Iterates turns in order.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Looks a turn up by id.
    pub fn get_by_id(&self, id: u64) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// Empties the log and resets the id counter; the next turn gets id 0.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.next_id = 0;
        self.relevance_cache.clear();
    }

    /// Selects the prior turns relevant to `current_query` per the selector's
    /// strategy. Judged results are cached per query hash until the next
    /// `add_turn` or `clear`.
    pub async fn select_relevant(
        &mut self,
        current_query: &str,
        selector: &TurnSelector,
    ) -> Vec<Turn> {
        if self.turns.is_empty() {
            return vec![];
        }
        match selector {
            TurnSelector::Recency { window } => self.last_n(*window),
            TurnSelector::LlmJudged { llm, window } => {
                let cache_key = short_hash(current_query, 8);
                if let Some(ids) = self.relevance_cache.get(&cache_key) {
                    return self.by_ids(ids);
                }
                let ids = self.judge_relevant(llm.as_ref(), current_query, *window).await;
                self.relevance_cache.insert(cache_key, ids.clone());
                self.by_ids(&ids)
            }
            TurnSelector::Embedding { embedder, top_k } => {
                match self.rank_by_embedding(embedder.as_ref(), current_query, *top_k).await {
                    Ok(turns) => turns,
                    Err(e) => {
                        warn!(error = %e, "embedding selection failed, falling back to recency");
                        self.last_n(*top_k)
                    }
                }
            }
        }
    }

    fn last_n(&self, n: usize) -> Vec<Turn> {
        let start = self.turns.len().saturating_sub(n);
        self.turns[start..].to_vec()
    }

    fn by_ids(&self, ids: &[u64]) -> Vec<Turn> {
        self.turns
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect()
    }

    /// Asks the fast model for relevant turn ids. Failure yields no context
    /// (unlike the context store, which falls back to everything).
    async fn judge_relevant(&self, llm: &dyn LlmClient, query: &str, window: usize) -> Vec<u64> {
        let candidates = self.last_n(window);
        let mut listing = String::new();
        for t in &candidates {
            listing.push_str(&format!("id={} query={} summary={}\n", t.id, t.query, t.summary));
        }
        let user = format!("New query: {}\n\nPrior turns:\n{}", query, listing);
        let messages = [Message::system(TURN_RELEVANCE_SYSTEM), Message::user(user)];

        #[derive(serde::Deserialize)]
        struct Selection {
            message_ids: Vec<u64>,
        }

        let selection = match llm.invoke(&messages).await {
            Ok(resp) => parse_structured::<Selection>("history-relevance", &resp.content),
            Err(e) => Err(e),
        };
        match selection {
            Ok(sel) => sel.message_ids,
            Err(e) => {
                warn!(error = %e, "turn relevance selection failed, injecting no context");
                vec![]
            }
        }
    }

    /// Ranks prior turns by cosine similarity of summary embeddings against
    /// the query embedding; returns the top K in chronological order.
    async fn rank_by_embedding(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Turn>, AgentError> {
        let mut texts: Vec<&str> = vec![query];
        texts.extend(self.turns.iter().map(|t| t.summary.as_str()));
        let vectors = embedder.embed(&texts).await?;
        let (query_vec, turn_vecs) = match vectors.split_first() {
            Some(split) => split,
            None => return Ok(vec![]),
        };

        let mut scored: Vec<(f32, &Turn)> = self
            .turns
            .iter()
            .zip(turn_vecs)
            .map(|(t, v)| (cosine_similarity(query_vec, v), t))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut top: Vec<Turn> = scored.into_iter().take(top_k).map(|(_, t)| t.clone()).collect();
        top.sort_by_key(|t| t.id);
        Ok(top)
    }
}

/// Strategy for choosing which prior turns enter a prompt.
#[derive(Clone)]
pub enum TurnSelector {
    /// Last `window` turns, no model call.
    Recency { window: usize },
    /// Fast-model judgement over the last `window` turns, cached per query.
    LlmJudged {
        llm: Arc<dyn LlmClient>,
        window: usize,
    },
    /// Top `top_k` turns by summary-embedding similarity.
    Embedding {
        embedder: Arc<dyn Embedder>,
        top_k: usize,
    },
}

/// Lightweight rendering for Understand / Plan prompts: summaries only.
pub fn format_for_planning(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.query, t.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Full rendering for the Answer prompt: complete answers.
pub fn format_for_answer(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.query, t.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic summary fallback: query prefix plus answer prefix, safe on
/// char boundaries.
pub fn preview_summary(query: &str, answer: &str) -> String {
    format!(
        "{} — {}",
        prefix_chars(query, PREVIEW_QUERY_CHARS),
        prefix_chars(answer, PREVIEW_ANSWER_CHARS)
    )
}

fn prefix_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}

/// LLM turn summariser with the deterministic preview as its failure path.
#[derive(Clone)]
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produces a one- to two-sentence summary, or `None` when the model
    /// fails or returns nothing; the caller then stores the preview.
    pub async fn summarize(&self, query: &str, answer: &str) -> Option<String> {
        let user = format!("User: {}\n\nAssistant: {}", query, answer);
        let messages = [Message::system(TURN_SUMMARY_SYSTEM), Message::user(user)];
        match self.llm.invoke(&messages).await {
            Ok(resp) => {
                let summary = resp.content.trim().to_string();
                (!summary.is_empty()).then_some(summary)
            }
            Err(e) => {
                warn!(error = %e, "turn summary failed, using deterministic preview");
                None
            }
        }
    }
}
