//! Reference actions exposed to the research loop's tool-calling LLM (§4.5).
//! `web_search`/`academic_search`/`discussion_search` each wrap a
//! [`SearchBackend`]; `personal_search` wraps an [`EmbeddingProvider`] over a
//! per-user memory store; `done` is the zero-op terminal action the research
//! loop watches for to leave the `executing` state (§4.6).

use crate::backend::SearchBackend;
use crate::registry::{Action, ActionContext, ActionOutcome};
use async_trait::async_trait;
use searchagent_core::{ClassifierOutput, Chunk};
use searchagent_llm::EmbeddingProvider;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct QueriesParams {
    queries: Vec<String>,
}

fn queries_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { "queries": { "type": "array", "items": { "type": "string" } } },
        "required": ["queries"],
    })
}

/// Runs every query against the backend and concatenates the resulting
/// chunks, preserving first-occurrence order across queries (§4.6's output
/// ordering rule applies one level up, at the research loop's aggregation).
async fn search_all(backend: &Arc<dyn SearchBackend>, queries: &[String]) -> Result<Vec<Chunk>, String> {
    if queries.is_empty() {
        return Err("queries must be non-empty".to_string());
    }
    let mut chunks = Vec::new();
    for query in queries {
        chunks.extend(backend.search(query).await?);
    }
    Ok(chunks)
}

pub struct WebSearchAction {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchAction {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for WebSearchAction {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the general web for information relevant to the query."
    }
    fn parameter_schema(&self) -> serde_json::Value {
        queries_schema()
    }
    fn enabled_for(&self, classifier: &ClassifierOutput) -> bool {
        !classifier.skip_search
    }
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome, String> {
        let params: QueriesParams = serde_json::from_value(ctx.params).map_err(|e| e.to_string())?;
        let chunks = search_all(&self.backend, &params.queries).await?;
        Ok(ActionOutcome { chunks, ..Default::default() })
    }
}

pub struct AcademicSearchAction {
    backend: Arc<dyn SearchBackend>,
}

impl AcademicSearchAction {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for AcademicSearchAction {
    fn name(&self) -> &str {
        "academic_search"
    }
    fn description(&self) -> &str {
        "Search academic papers and publications relevant to the query."
    }
    fn parameter_schema(&self) -> serde_json::Value {
        queries_schema()
    }
    fn enabled_for(&self, classifier: &ClassifierOutput) -> bool {
        classifier.academic_search
    }
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome, String> {
        let params: QueriesParams = serde_json::from_value(ctx.params).map_err(|e| e.to_string())?;
        let chunks = search_all(&self.backend, &params.queries).await?;
        Ok(ActionOutcome { chunks, ..Default::default() })
    }
}

pub struct DiscussionSearchAction {
    backend: Arc<dyn SearchBackend>,
}

impl DiscussionSearchAction {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Action for DiscussionSearchAction {
    fn name(&self) -> &str {
        "discussion_search"
    }
    fn description(&self) -> &str {
        "Search forums and discussion threads relevant to the query."
    }
    fn parameter_schema(&self) -> serde_json::Value {
        queries_schema()
    }
    fn enabled_for(&self, classifier: &ClassifierOutput) -> bool {
        classifier.discussion_search
    }
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome, String> {
        let params: QueriesParams = serde_json::from_value(ctx.params).map_err(|e| e.to_string())?;
        let chunks = search_all(&self.backend, &params.queries).await?;
        Ok(ActionOutcome { chunks, ..Default::default() })
    }
}

/// Searches the user's own prior conversation turns by embedding similarity.
/// §1 puts real vector storage out of scope; this ranks the supplied history
/// by a cosine similarity over `EmbeddingProvider::embed`, which is enough to
/// exercise the action's contract without a persistent index.
pub struct PersonalSearchAction {
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl PersonalSearchAction {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl Action for PersonalSearchAction {
    fn name(&self) -> &str {
        "personal_search"
    }
    fn description(&self) -> &str {
        "Search the user's own prior conversation turns for relevant context."
    }
    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"],
        })
    }
    fn enabled_for(&self, classifier: &ClassifierOutput) -> bool {
        classifier.personal_search
    }
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome, String> {
        #[derive(Deserialize)]
        struct PersonalSearchParams {
            query: String,
        }
        let params: PersonalSearchParams = serde_json::from_value(ctx.params).map_err(|e| e.to_string())?;
        if ctx.history.is_empty() {
            return Ok(ActionOutcome::default());
        }

        let query_vec = self.embeddings.embed(&params.query).await.map_err(|e| e.to_string())?;
        let mut scored: Vec<(f32, &searchagent_core::ChatTurn)> = Vec::new();
        for turn in &ctx.history {
            if turn.content.trim().is_empty() {
                continue;
            }
            let turn_vec = self.embeddings.embed(&turn.content).await.map_err(|e| e.to_string())?;
            scored.push((cosine_similarity(&query_vec, &turn_vec), turn));
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let chunks = scored
            .into_iter()
            .take(5)
            .map(|(score, turn)| Chunk {
                title: format!("prior {:?} turn", turn.role),
                url: String::new(),
                content: turn.content.clone(),
                metadata: serde_json::json!({ "similarity": score }),
            })
            .collect();
        Ok(ActionOutcome { chunks, ..Default::default() })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let dot: f32 = a[..len].iter().zip(&b[..len]).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b[..len].iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Signals the research loop to leave the `executing` state (§4.6). Always
/// available; takes no meaningful parameters.
pub struct DoneAction;

#[async_trait]
impl Action for DoneAction {
    fn name(&self) -> &str {
        "done"
    }
    fn description(&self) -> &str {
        "Call this when enough information has been gathered to answer the query."
    }
    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {}, "required": [] })
    }
    fn enabled_for(&self, _classifier: &ClassifierOutput) -> bool {
        true
    }
    async fn execute(&self, _ctx: ActionContext) -> Result<ActionOutcome, String> {
        Ok(ActionOutcome { done: true, ..Default::default() })
    }
}
