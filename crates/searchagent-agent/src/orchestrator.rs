//! Orchestrator (§4.9): wires admission, session, classifier, the
//! widget/research fan-out, the writer, and the follow-up generator into one
//! request lifecycle, owning the single `CancellationToken` every stage below
//! it respects — directly mirroring how `agenticlaw-gateway`'s `start_gateway` hands
//! one `CancellationToken` down through `AgentRuntime::run_turn_cancellable`.

use crate::{classifier, followup, research, writer};
use searchagent_actions::ActionRegistry;
use searchagent_admission::{AdmissionController, Ticket};
use searchagent_core::{
    BlockKind, ChatRole, ChatTurn, Error, FinalAggregate, OptimizationMode, Result, Session, UserId,
};
use searchagent_llm::LlmProvider;
use searchagent_widgets::{WidgetExecutorConfig, WidgetRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-request knobs the gateway extracts from the wire request (§6:
/// `mode`, `modelConfig`, `systemInstructions`).
pub struct RequestInput {
    pub user: UserId,
    pub query: String,
    pub history: Vec<ChatTurn>,
    pub mode: OptimizationMode,
    pub system_instructions: Option<String>,
    pub max_iterations_override: Option<usize>,
}

/// Model ids and follow-up tuning, generalizing `agenticlaw-agent`'s `AgentConfig`
/// (§6 Configuration surface).
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub chat_model: String,
    pub follow_up_limit: usize,
    pub follow_up_max_len: usize,
    pub follow_up_recent_k: usize,
    pub widget_executor: WidgetExecutorConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            chat_model: "claude-sonnet-4-5-20250929".to_string(),
            follow_up_limit: 3,
            follow_up_max_len: 140,
            follow_up_recent_k: 5,
            widget_executor: WidgetExecutorConfig::default(),
        }
    }
}

/// Dedup key for a source URL: host normalized case-insensitively, path
/// exact (§8 invariant). No query string is part of the key.
fn normalized_url_key(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let authority_end = without_scheme.find('/').unwrap_or(without_scheme.len());
    let (authority, rest) = without_scheme.split_at(authority_end);
    let path = rest.split(['?', '#']).next().unwrap_or(rest);
    format!("{}{path}", authority.to_lowercase())
}

fn dedup_preserving_order(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for url in urls {
        if seen.insert(normalized_url_key(&url)) {
            out.push(url);
        }
    }
    out
}

fn card_link(card: &serde_json::Value) -> Option<String> {
    card.get("link").and_then(|v| v.as_str()).map(str::to_string)
}

fn card_image(card: &serde_json::Value) -> Option<String> {
    card.get("photo")
        .or_else(|| card.get("image"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn last_user_queries(history: &[ChatTurn], current: &str, k: usize) -> Vec<String> {
    let mut queries: Vec<String> = history
        .iter()
        .filter(|t| t.role == ChatRole::User)
        .map(|t| t.content.clone())
        .collect();
    queries.push(current.to_string());
    let len = queries.len();
    queries.into_iter().skip(len.saturating_sub(k)).collect()
}

/// Run one request end to end. `ticket` is held for the duration and
/// released on every exit path (success, component failure, or abort) by its
/// `Drop` impl (§4.2).
pub async fn run(
    session: Arc<Session>,
    ticket: Ticket,
    admission: &AdmissionController,
    widget_registry: &WidgetRegistry,
    action_registry: &ActionRegistry,
    provider: Arc<dyn LlmProvider>,
    config: &AgentConfig,
    input: RequestInput,
) -> Result<()> {
    let _ticket = ticket;
    let abort = session.abort_signal();

    if session.emit_block(BlockKind::Text, serde_json::json!({ "text": [] })).is_err() {
        warn!("session {} already terminal at announce", session.id);
        return Ok(());
    }

    if abort.is_cancelled() {
        session.emit_error("aborted", "client disconnected before classification");
        return Err(Error::Aborted);
    }

    let classifier_output = classifier::classify(&provider, &input.query, &input.history).await;

    let widgets_fut = searchagent_widgets::execute_all(
        &session,
        widget_registry,
        &classifier_output,
        &input.query,
        &input.history,
        abort.clone(),
        config.widget_executor,
    );
    let research_fut = research::run(
        &session,
        action_registry,
        &provider,
        &classifier_output,
        &input.query,
        &input.history,
        input.mode,
        input.max_iterations_override,
        &config.chat_model,
        abort.clone(),
    );

    let (widget_outputs, research_output) = tokio::join!(widgets_fut, research_fut);

    if abort.is_cancelled() {
        session.emit_error("aborted", "client disconnected before writing the answer");
        return Err(Error::Aborted);
    }

    let widget_contexts: Vec<String> = widget_outputs
        .iter()
        .filter(|w| w.success && !w.llm_context.is_empty())
        .map(|w| w.llm_context.clone())
        .collect();

    if let Err(e) = writer::run(
        &session,
        &provider,
        &input.query,
        &input.history,
        &research_output.chunks,
        &widget_contexts,
        input.system_instructions.as_deref(),
        &config.chat_model,
        abort.clone(),
    )
    .await
    {
        session.emit_error(e.code(), &e.to_string());
        return Err(e);
    }

    let answer = session.text_blocks_in_order().join("");

    admission.memory().append(
        &input.user,
        vec![
            ChatTurn { role: ChatRole::User, content: input.query.clone(), tool_call: None, tool_call_id: None },
            ChatTurn { role: ChatRole::Assistant, content: answer.clone(), tool_call: None, tool_call_id: None },
        ],
    );

    let cards: Vec<serde_json::Value> = widget_outputs.iter().flat_map(|w| w.cards.clone()).collect();
    let recent_queries = last_user_queries(&input.history, &input.query, config.follow_up_recent_k);
    let follow_ups = followup::generate(
        &provider,
        &input.query,
        &answer,
        &cards,
        &input.history,
        &recent_queries,
        config.follow_up_limit,
        config.follow_up_max_len,
    )
    .await;

    let mut source_urls: Vec<String> = research_output.chunks.iter().map(|c| c.url.clone()).collect();
    source_urls.extend(widget_outputs.iter().flat_map(|w| w.cards.iter()).filter_map(card_link));
    let sources = dedup_preserving_order(source_urls);

    let mut image_urls = research_output.images.clone();
    image_urls.extend(widget_outputs.iter().flat_map(|w| w.cards.iter()).filter_map(card_image));
    let images = dedup_preserving_order(image_urls);

    let mut cards_by_domain: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for widget in &widget_outputs {
        if widget.success && !widget.cards.is_empty() {
            cards_by_domain.entry(widget.widget_type.clone()).or_default().extend(widget.cards.clone());
        }
    }

    let aggregate = FinalAggregate {
        answer,
        follow_up_suggestions: follow_ups,
        sources,
        images,
        cards_by_domain,
    };

    if let Err(e) = session.emit_end(&aggregate) {
        warn!("session {} failed to emit end: {e}", session.id);
    }
    info!("session {} completed", session.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_url_key_is_host_case_insensitive_path_exact() {
        assert_eq!(
            normalized_url_key("https://Example.com/Foo"),
            normalized_url_key("https://example.com/Foo")
        );
        assert_ne!(
            normalized_url_key("https://example.com/Foo"),
            normalized_url_key("https://example.com/foo")
        );
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let urls = vec![
            "https://a.test/1".to_string(),
            "https://b.test/2".to_string(),
            "https://A.test/1".to_string(),
        ];
        assert_eq!(dedup_preserving_order(urls), vec!["https://a.test/1".to_string(), "https://b.test/2".to_string()]);
    }

    #[test]
    fn last_user_queries_caps_at_k_and_includes_current() {
        let history = vec![
            ChatTurn { role: ChatRole::User, content: "one".to_string(), tool_call: None, tool_call_id: None },
            ChatTurn { role: ChatRole::Assistant, content: "a".to_string(), tool_call: None, tool_call_id: None },
            ChatTurn { role: ChatRole::User, content: "two".to_string(), tool_call: None, tool_call_id: None },
        ];
        let recent = last_user_queries(&history, "three", 2);
        assert_eq!(recent, vec!["two".to_string(), "three".to_string()]);
    }
}
