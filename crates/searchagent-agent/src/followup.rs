//! Follow-up Generator (§4.8): one structured-output LLM call producing up to
//! N contextual next-step queries. The second consumer (after the
//! Classifier) of `LlmProvider::generate_structured`'s forced-tool-call
//! technique.

use searchagent_core::{ChatRole, ChatTurn};
use searchagent_llm::{LlmMessage, LlmProvider, LlmRequest};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "\
Given the user's query, the answer produced, and any cards surfaced, suggest \
a short list of natural follow-up queries the user might ask next. Keep each \
suggestion concise and self-contained. Respond only by calling the provided \
tool.";

#[derive(Deserialize)]
struct FollowUpOutput {
    suggestions: Vec<String>,
}

fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "suggestions": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["suggestions"]
    })
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// §4.8: generate ≤ `limit` suggestions, each truncated to `max_len` chars,
/// deduplicated case-insensitively, and filtered against the normalized form
/// of any of the last `recent_user_queries` (already the caller's last-K
/// slice). Returns an empty vector on any LLM failure (soft failure, §7).
pub async fn generate(
    provider: &Arc<dyn LlmProvider>,
    query: &str,
    answer: &str,
    cards: &[serde_json::Value],
    history: &[ChatTurn],
    recent_user_queries: &[String],
    limit: usize,
    max_len: usize,
) -> Vec<String> {
    let mut prompt = format!("User query: {query}\n\nAnswer given:\n{answer}\n");
    if !cards.is_empty() {
        prompt.push_str(&format!("\nCards surfaced: {}\n", serde_json::Value::Array(cards.to_vec())));
    }

    let mut messages: Vec<LlmMessage> = history
        .iter()
        .map(|turn| match turn.role {
            ChatRole::User => LlmMessage::user(turn.content.clone()),
            ChatRole::Assistant => LlmMessage::assistant(turn.content.clone()),
            ChatRole::Tool => LlmMessage::user(turn.content.clone()),
        })
        .collect();
    messages.push(LlmMessage::user(prompt));

    let request = LlmRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        messages,
        max_tokens: Some(512),
        ..Default::default()
    };

    let raw = match provider.generate_structured(request, schema()).await {
        Ok(value) => match serde_json::from_value::<FollowUpOutput>(value) {
            Ok(out) => out.suggestions,
            Err(e) => {
                warn!("follow-up generator: structured output did not match schema: {e}");
                return Vec::new();
            }
        },
        Err(e) => {
            warn!("follow-up generator: LLM call failed: {e}");
            return Vec::new();
        }
    };

    let excluded: HashSet<String> = recent_user_queries.iter().map(|q| normalize(q)).collect();
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();

    for s in raw {
        let truncated: String = s.chars().take(max_len).collect();
        let key = normalize(&truncated);
        if key.is_empty() || excluded.contains(&key) || !seen.insert(key) {
            continue;
        }
        suggestions.push(truncated);
        if suggestions.len() >= limit {
            break;
        }
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use searchagent_llm::{LlmError, LlmResult, LlmStream};
    use tokio_util::sync::CancellationToken;

    struct ScriptedProvider {
        suggestions: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> &[&str] {
            &[]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            unimplemented!("followup generator only calls generate_structured")
        }
        async fn generate_structured(
            &self,
            _request: LlmRequest,
            _schema: serde_json::Value,
        ) -> LlmResult<serde_json::Value> {
            Ok(serde_json::json!({ "suggestions": self.suggestions }))
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        fn models(&self) -> &[&str] {
            &[]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            unimplemented!()
        }
        async fn generate_structured(
            &self,
            _request: LlmRequest,
            _schema: serde_json::Value,
        ) -> LlmResult<serde_json::Value> {
            Err(LlmError::RequestFailed("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn dedupes_case_insensitively_and_respects_limit() {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(ScriptedProvider { suggestions: vec!["What about X?", "what about x?", "What about Y?", "Z?"] });
        let out = generate(&provider, "q", "a", &[], &[], &[], 2, 100).await;
        assert_eq!(out, vec!["What about X?".to_string(), "What about Y?".to_string()]);
    }

    #[tokio::test]
    async fn excludes_recent_user_queries() {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(ScriptedProvider { suggestions: vec!["already asked", "something new"] });
        let recent = vec!["Already Asked".to_string()];
        let out = generate(&provider, "q", "a", &[], &[], &recent, 5, 100).await;
        assert_eq!(out, vec!["something new".to_string()]);
    }

    #[tokio::test]
    async fn truncates_to_max_len() {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider { suggestions: vec!["0123456789"] });
        let out = generate(&provider, "q", "a", &[], &[], &[], 5, 5).await;
        assert_eq!(out, vec!["01234".to_string()]);
    }

    #[tokio::test]
    async fn returns_empty_on_llm_failure() {
        let provider: Arc<dyn LlmProvider> = Arc::new(FailingProvider);
        let out = generate(&provider, "q", "a", &[], &[], &[], 3, 100).await;
        assert!(out.is_empty());
    }
}
