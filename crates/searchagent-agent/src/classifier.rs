//! Classifier (§4.3): a single structured-output LLM call that decides which
//! widgets to show and which search sources the research loop should use.
//! Grounded in `agenticlaw-agent`'s request-building pattern
//! (`agenticlaw-agent::runtime::run_turn_cancellable` assembling an
//! `LlmRequest` from a system prompt + transcript) but consuming the
//! non-streamed `generate_structured` capability instead of a text stream.

use searchagent_core::{ChatTurn, ClassifierOutput};
use searchagent_llm::{LlmMessage, LlmProvider, LlmRequest};
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "\
You are a request classifier for a research assistant. Given the user's \
query and conversation history, decide: whether a web search is needed at \
all, which specialized search sources apply (academic, discussion, \
personal), which widgets (if any) would help answer the query directly, \
and a standalone rewrite of the query that resolves pronouns and context \
from the conversation history. Respond only by calling the provided tool.";

/// §4.3's fail-open invariant: any classifier failure (LLM error, malformed
/// structured output) falls back to `ClassifierOutput::permissive_default`,
/// never surfaces as a request-level error.
pub async fn classify(provider: &Arc<dyn LlmProvider>, query: &str, history: &[ChatTurn]) -> ClassifierOutput {
    let mut messages: Vec<LlmMessage> = history
        .iter()
        .map(|turn| match turn.role {
            searchagent_core::ChatRole::User => LlmMessage::user(turn.content.clone()),
            searchagent_core::ChatRole::Assistant => LlmMessage::assistant(turn.content.clone()),
            searchagent_core::ChatRole::Tool => LlmMessage::user(turn.content.clone()),
        })
        .collect();
    messages.push(LlmMessage::user(query.to_string()));

    let request = LlmRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        messages,
        max_tokens: Some(1024),
        ..Default::default()
    };

    match provider.generate_structured(request, ClassifierOutput::json_schema()).await {
        Ok(value) => match serde_json::from_value::<ClassifierOutput>(value) {
            Ok(output) => output,
            Err(e) => {
                warn!("classifier: structured output did not match ClassifierOutput: {e}");
                ClassifierOutput::permissive_default(query)
            }
        },
        Err(e) => {
            warn!("classifier: LLM call failed, falling back to permissive default: {e}");
            ClassifierOutput::permissive_default(query)
        }
    }
}
