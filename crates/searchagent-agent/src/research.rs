//! Research Loop (§4.6): bounded iterative tool-calling over the Action
//! Registry. Generalizes `agenticlaw-agent`'s `AgentRuntime::run_turn_cancellable`
//! tool-calling loop (`crates/agenticlaw-agent/src/runtime.rs`) — same
//! `tokio::select!`-driven cancellable-stream consumption and
//! accumulate-then-execute shape — into an explicit
//! `init`/`planning`/`executing`/`terminating` state machine, with the
//! safe-call-filtering step inserted before a transition to `executing`.

use futures::StreamExt;
use searchagent_actions::ActionRegistry;
use searchagent_core::{ChatRole, ChatTurn, ClassifierOutput, Chunk, OptimizationMode, Session, ToolCallDescriptor};
use searchagent_llm::{AccumulatedToolCall, LlmMessage, LlmProvider, LlmRequest, StreamDelta, ToolChoice};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "\
You are the research planner for an answer-synthesis pipeline. Decide what, \
if anything, still needs to be searched to answer the user's query well. \
Call one or more of the available search tools with concrete queries, or \
call `done` once you have gathered enough. Only call tools from the \
provided set with arguments that match their schema exactly.";

/// Output of the research loop (§4.6): union of chunks/images/videos across
/// every iteration, first-occurrence order preserved.
#[derive(Clone, Debug, Default)]
pub struct ResearchOutput {
    pub chunks: Vec<Chunk>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

fn to_llm_message(turn: &ChatTurn) -> LlmMessage {
    match turn.role {
        ChatRole::User => LlmMessage::user(turn.content.clone()),
        ChatRole::Assistant => LlmMessage::assistant(turn.content.clone()),
        ChatRole::Tool => LlmMessage::user(turn.content.clone()),
    }
}

/// Drains a streaming completion into accumulated text and tool calls, the
/// same accumulation loop `runtime.rs` uses, generalized to also respect an
/// external session abort signal in addition to the stream's own
/// cancellation wiring.
async fn drain_planning_stream(
    provider: &Arc<dyn LlmProvider>,
    request: LlmRequest,
    abort: &CancellationToken,
) -> Result<(String, Vec<AccumulatedToolCall>), String> {
    let stream = provider
        .complete_stream(request, Some(abort.clone()))
        .await
        .map_err(|e| e.to_string())?;
    tokio::pin!(stream);

    let mut text = String::new();
    let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
    let mut current: Option<AccumulatedToolCall> = None;

    loop {
        tokio::select! {
            biased;
            _ = abort.cancelled() => return Err("aborted".to_string()),
            delta = stream.next() => {
                match delta {
                    Some(Ok(StreamDelta::Text(t))) => text.push_str(&t),
                    Some(Ok(StreamDelta::Thinking(_))) => {}
                    Some(Ok(StreamDelta::ToolCallStart { id, name })) => {
                        current = Some(AccumulatedToolCall { id, name, arguments: String::new() });
                    }
                    Some(Ok(StreamDelta::ToolCallDelta { arguments, .. })) => {
                        if let Some(tc) = current.as_mut() {
                            tc.arguments.push_str(&arguments);
                        }
                    }
                    Some(Ok(StreamDelta::ToolCallEnd { .. })) => {
                        if let Some(tc) = current.take() {
                            tool_calls.push(tc);
                        }
                    }
                    Some(Ok(StreamDelta::Done { .. })) => break,
                    Some(Ok(StreamDelta::Error(e))) => return Err(e),
                    Some(Err(e)) => return Err(e.to_string()),
                    None => break,
                }
            }
        }
    }
    Ok((text, tool_calls))
}

/// Run the research loop for one request (§4.6). Skipped entirely
/// (`init` never leaves for `planning`) when `classifier.skip_search`.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    session: &Session,
    registry: &ActionRegistry,
    provider: &Arc<dyn LlmProvider>,
    classifier: &ClassifierOutput,
    query: &str,
    history: &[ChatTurn],
    mode: OptimizationMode,
    max_iterations_override: Option<usize>,
    model: &str,
    abort: CancellationToken,
) -> ResearchOutput {
    if classifier.skip_search {
        return ResearchOutput::default();
    }

    let max_iterations = max_iterations_override.unwrap_or_else(|| mode.default_max_iterations());
    let tools = registry.to_llm_tools(classifier);
    if tools.is_empty() {
        return ResearchOutput::default();
    }

    let mut messages: Vec<LlmMessage> = history.iter().map(to_llm_message).collect();
    messages.push(LlmMessage::user(query.to_string()));

    let mut output = ResearchOutput::default();
    let mut step = 0usize;

    'planning: loop {
        if abort.is_cancelled() {
            debug!("research loop: aborted before planning turn {}", step + 1);
            break;
        }
        step += 1;
        if step > max_iterations {
            debug!("research loop: iteration cap ({max_iterations}) reached");
            break;
        }

        let request = LlmRequest {
            model: model.to_string(),
            messages: messages.clone(),
            tools: Some(tools.clone()),
            tool_choice: Some(ToolChoice::Auto),
            system: Some(SYSTEM_PROMPT.to_string()),
            ..Default::default()
        };

        let (text, tool_calls) = match drain_planning_stream(provider, request, &abort).await {
            Ok(v) => v,
            Err(e) => {
                warn!("research loop: planning turn failed: {e}");
                break;
            }
        };

        if tool_calls.is_empty() {
            debug!("research loop: planning turn produced no tool calls, stopping");
            break;
        }

        // Safe-list filtering (§4.5, §4.6): drop calls whose params don't
        // parse against their action's schema before committing to `executing`.
        let mut safe_calls = Vec::new();
        for tc in &tool_calls {
            let params: serde_json::Value = match tc.parse_arguments() {
                Ok(v) => v,
                Err(e) => {
                    warn!("research loop: unsafe tool call '{}': malformed arguments: {e}", tc.name);
                    continue;
                }
            };
            if let Err(e) = registry.validate_call(&tc.name, &params) {
                warn!("research loop: unsafe tool call '{}': {e}", tc.name);
                continue;
            }
            safe_calls.push((tc.id.clone(), tc.name.clone(), params));
        }

        if safe_calls.is_empty() {
            // All calls unsafe: skip this iteration without mutating the
            // transcript, but it still counts against the iteration budget.
            debug!("research loop: all tool calls unsafe, retrying planning");
            continue 'planning;
        }

        // executing: commit the assistant tool_calls message (safe calls
        // only) and append per-tool results.
        let tool_call_tuples: Vec<(String, String, serde_json::Value)> = safe_calls.clone();
        messages.push(LlmMessage::assistant_tool_calls(
            (!text.is_empty()).then_some(text),
            &tool_call_tuples,
        ));

        let descriptors: Vec<ToolCallDescriptor> = safe_calls
            .iter()
            .map(|(id, name, params)| ToolCallDescriptor {
                id: id.clone(),
                name: name.clone(),
                arguments: serde_json::to_string(params).unwrap_or_default(),
            })
            .collect();
        let action_names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        let results = registry.execute_all(descriptors, history, abort.clone()).await;

        let mut done_called = false;
        for result in &results {
            messages.push(LlmMessage::tool_result(
                result.tool_call_id.clone(),
                result.to_transcript_content(),
                result.is_error,
            ));
            output.chunks.extend(result.chunks.iter().cloned());
            output.images.extend(result.images.iter().cloned());
            output.videos.extend(result.videos.iter().cloned());
            done_called = done_called || result.done;
        }

        if let Err(e) = session.emit_research_progress(step, max_iterations, action_names) {
            warn!("research loop: failed to emit progress event: {e}");
        }

        if done_called {
            debug!("research loop: 'done' called at step {step}, terminating");
            break;
        }
        if step >= max_iterations {
            debug!("research loop: reached max_iterations ({max_iterations}) after executing");
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use searchagent_actions::{DoneAction, MockSearchBackend, WebSearchAction};
    use searchagent_llm::{LlmError, LlmResult, LlmStream};

    /// Scripted provider: always calls `done` on the first planning turn so
    /// the loop terminates quickly in tests.
    struct DoneImmediatelyProvider;

    #[async_trait]
    impl LlmProvider for DoneImmediatelyProvider {
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
            let deltas = vec![
                Ok(StreamDelta::ToolCallStart { id: "1".to_string(), name: "done".to_string() }),
                Ok(StreamDelta::ToolCallDelta { id: "1".to_string(), arguments: "{}".to_string() }),
                Ok(StreamDelta::ToolCallEnd { id: "1".to_string() }),
                Ok(StreamDelta::Done { stop_reason: Some("tool_use".to_string()), usage: None }),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    /// Scripted provider that never calls `done`, to exercise the iteration cap.
    struct NeverDoneProvider;

    #[async_trait]
    impl LlmProvider for NeverDoneProvider {
        fn name(&self) -> &str {
            "scripted-never-done"
        }
        fn models(&self) -> &[&str] {
            &[]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let deltas = vec![
                Ok(StreamDelta::ToolCallStart { id: "1".to_string(), name: "web_search".to_string() }),
                Ok(StreamDelta::ToolCallDelta {
                    id: "1".to_string(),
                    arguments: r#"{"queries":["x"]}"#.to_string(),
                }),
                Ok(StreamDelta::ToolCallEnd { id: "1".to_string() }),
                Ok(StreamDelta::Done { stop_reason: Some("tool_use".to_string()), usage: None }),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    struct MalformedToolCallProvider;

    #[async_trait]
    impl LlmProvider for MalformedToolCallProvider {
        fn name(&self) -> &str {
            "scripted-malformed"
        }
        fn models(&self) -> &[&str] {
            &[]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let deltas = vec![
                Ok(StreamDelta::ToolCallStart { id: "1".to_string(), name: "web_search".to_string() }),
                Ok(StreamDelta::ToolCallDelta { id: "1".to_string(), arguments: "not json".to_string() }),
                Ok(StreamDelta::ToolCallEnd { id: "1".to_string() }),
                Ok(StreamDelta::Done { stop_reason: Some("tool_use".to_string()), usage: None }),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    fn registry_with_web_and_done() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(WebSearchAction::new(Arc::new(MockSearchBackend::new("web"))));
        registry.register(DoneAction);
        registry
    }

    #[tokio::test]
    async fn skips_entirely_when_skip_search() {
        let session = Session::new();
        let registry = registry_with_web_and_done();
        let provider: Arc<dyn LlmProvider> = Arc::new(DoneImmediatelyProvider);
        let mut classifier = ClassifierOutput::permissive_default("q");
        classifier.skip_search = true;

        let output = run(
            &session,
            &registry,
            &provider,
            &classifier,
            "q",
            &[],
            OptimizationMode::Balanced,
            None,
            "test-model",
            CancellationToken::new(),
        )
        .await;
        assert!(output.chunks.is_empty());
        assert_eq!(session.event_log_len(), 0);
    }

    #[tokio::test]
    async fn terminates_on_done_without_hitting_cap() {
        let session = Session::new();
        let registry = registry_with_web_and_done();
        let provider: Arc<dyn LlmProvider> = Arc::new(DoneImmediatelyProvider);
        let classifier = ClassifierOutput::permissive_default("q");

        let output = run(
            &session,
            &registry,
            &provider,
            &classifier,
            "q",
            &[],
            OptimizationMode::Quality,
            None,
            "test-model",
            CancellationToken::new(),
        )
        .await;
        assert!(output.chunks.is_empty());
        // one researchProgress -> one `block` event in the session log.
        assert_eq!(session.event_log_len(), 1);
    }

    #[tokio::test]
    async fn stops_at_iteration_cap_when_done_never_called() {
        let session = Session::new();
        let registry = registry_with_web_and_done();
        let provider: Arc<dyn LlmProvider> = Arc::new(NeverDoneProvider);
        let classifier = ClassifierOutput::permissive_default("q");

        let output = run(
            &session,
            &registry,
            &provider,
            &classifier,
            "q",
            &[],
            OptimizationMode::Speed,
            None,
            "test-model",
            CancellationToken::new(),
        )
        .await;
        // speed mode caps at 2 iterations, each contributing 3 web_search chunks.
        assert_eq!(output.chunks.len(), 6);
    }

    #[tokio::test]
    async fn unsafe_tool_call_is_dropped_and_iteration_still_counts() {
        let session = Session::new();
        let registry = registry_with_web_and_done();
        let provider: Arc<dyn LlmProvider> = Arc::new(MalformedToolCallProvider);
        let classifier = ClassifierOutput::permissive_default("q");

        let output = run(
            &session,
            &registry,
            &provider,
            &classifier,
            "q",
            &[],
            OptimizationMode::Speed,
            None,
            "test-model",
            CancellationToken::new(),
        )
        .await;
        // Every planning turn is unsafe, so no researchProgress is ever emitted
        // and no chunks are collected, but the loop still stops at the cap.
        assert!(output.chunks.is_empty());
        assert_eq!(session.event_log_len(), 0);
    }
}
