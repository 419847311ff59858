//! Answer Writer (§4.7): streams the final answer from the LLM, partitioning
//! it into one or more `text` blocks and emitting RFC-6902 patches per delta.
//! Grounded in `agenticlaw-agent`'s streaming-delta consumption loop
//! (`agenticlaw-agent::runtime`'s `StreamDelta::Text` accumulation), adapted
//! to emit Session/Block protocol events instead of an `AgentEvent` channel.

use futures::StreamExt;
use searchagent_core::{append_text_patch, BlockId, BlockKind, ChatRole, ChatTurn, Chunk, Error, Result, Session};
use searchagent_llm::{LlmMessage, LlmProvider, LlmRequest, StreamDelta};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const BASE_SYSTEM_PROMPT: &str = "\
You are a research assistant. Write a clear, well-organized answer to the \
user's query using the provided search context and widget context where \
relevant. Cite sources inline as [1], [2], etc. matching the numbered list. \
If the context doesn't fully answer the query, say so plainly rather than \
inventing facts.";

/// A heading-line boundary the writer treats as a natural place to start a
/// new text block (§4.7: "MAY partition ... at natural boundaries").
const HEADING_BOUNDARY: &str = "\n## ";

fn render_chunks(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let mut out = String::from("Search results:\n");
    for (i, c) in chunks.iter().enumerate() {
        out.push_str(&format!("[{}] {} ({})\n{}\n\n", i + 1, c.title, c.url, c.content));
    }
    out
}

fn render_widget_contexts(contexts: &[String]) -> String {
    if contexts.is_empty() {
        return String::new();
    }
    let mut out = String::from("Widget context:\n");
    for c in contexts {
        out.push_str(&format!("- {c}\n"));
    }
    out
}

fn to_llm_message(turn: &ChatTurn) -> LlmMessage {
    match turn.role {
        ChatRole::User => LlmMessage::user(turn.content.clone()),
        ChatRole::Assistant => LlmMessage::assistant(turn.content.clone()),
        ChatRole::Tool => LlmMessage::user(turn.content.clone()),
    }
}

/// Tracks the writer's currently-open text block across a stream of deltas,
/// splitting into a new block at heading boundaries.
struct BlockCursor<'a> {
    session: &'a Session,
    current: Option<BlockId>,
}

impl<'a> BlockCursor<'a> {
    fn new(session: &'a Session) -> Self {
        Self { session, current: None }
    }

    fn push(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        // Only split on a heading boundary once a block is already open; a
        // heading at the very start of the answer doesn't need its own block.
        if self.current.is_some() {
            if let Some(idx) = text.find(HEADING_BOUNDARY) {
                self.append_to_current(&text[..idx])?;
                self.current = None;
                return self.append_to_current(&text[idx + 1..]);
            }
        }
        self.append_to_current(text)
    }

    fn append_to_current(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        match &self.current {
            Some(id) => self.session.update_block(id, append_text_patch(text)),
            None => {
                let id = self
                    .session
                    .emit_block(BlockKind::Text, serde_json::json!({ "text": [text] }))?;
                self.current = Some(id);
                Ok(())
            }
        }
    }

    /// Appends a short error-note sentinel to whatever block is open, per
    /// §4.7's mid-stream failure handling. No-op if no block was ever opened.
    fn append_error_note(&mut self, note: &str) {
        if let Some(id) = &self.current {
            let _ = self.session.update_block(id, append_text_patch(note));
        }
    }
}

/// Assemble context, stream the answer, and emit block/updateBlock events
/// (§4.7). The only component whose failure aborts the request (§7).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    session: &Session,
    provider: &Arc<dyn LlmProvider>,
    query: &str,
    history: &[ChatTurn],
    chunks: &[Chunk],
    widget_contexts: &[String],
    system_instructions: Option<&str>,
    model: &str,
    abort: CancellationToken,
) -> Result<()> {
    let mut system = BASE_SYSTEM_PROMPT.to_string();
    system.push_str("\n\n");
    system.push_str(&render_chunks(chunks));
    system.push_str(&render_widget_contexts(widget_contexts));
    if let Some(extra) = system_instructions {
        system.push_str("\n\nAdditional instructions:\n");
        system.push_str(extra);
    }

    let mut messages: Vec<LlmMessage> = history.iter().map(to_llm_message).collect();
    messages.push(LlmMessage::user(query.to_string()));

    let request = LlmRequest {
        model: model.to_string(),
        messages,
        system: Some(system),
        ..Default::default()
    };

    let stream = provider
        .complete_stream(request, Some(abort.clone()))
        .await
        .map_err(|e| Error::WriterFailed(e.to_string()))?;
    tokio::pin!(stream);

    let mut cursor = BlockCursor::new(session);

    loop {
        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                cursor.append_error_note("\n\n[answer interrupted]");
                return Err(Error::Aborted);
            }
            delta = stream.next() => {
                match delta {
                    Some(Ok(StreamDelta::Text(text))) => {
                        cursor.push(&text)?;
                    }
                    Some(Ok(StreamDelta::Thinking(_))) => {}
                    Some(Ok(StreamDelta::ToolCallStart { .. }))
                    | Some(Ok(StreamDelta::ToolCallDelta { .. }))
                    | Some(Ok(StreamDelta::ToolCallEnd { .. })) => {
                        // The writer never declares tools; ignore defensively.
                    }
                    Some(Ok(StreamDelta::Done { .. })) => break,
                    Some(Ok(StreamDelta::Error(message))) => {
                        warn!("writer: stream error mid-output: {message}");
                        cursor.append_error_note("\n\n[error generating the rest of this answer]");
                        return Err(Error::WriterFailed(message));
                    }
                    Some(Err(e)) => {
                        warn!("writer: stream error mid-output: {e}");
                        cursor.append_error_note("\n\n[error generating the rest of this answer]");
                        return Err(Error::WriterFailed(e.to_string()));
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use searchagent_llm::{LlmResult, LlmStream};

    struct ScriptedProvider {
        deltas: Vec<StreamDelta>,
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
            let deltas: Vec<_> = self.deltas.clone().into_iter().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    #[tokio::test]
    async fn streams_single_block_on_no_heading() {
        let session = Session::new();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider {
            deltas: vec![
                StreamDelta::Text("Hello ".to_string()),
                StreamDelta::Text("world.".to_string()),
                StreamDelta::Done { stop_reason: Some("end_turn".to_string()), usage: None },
            ],
        });

        run(&session, &provider, "hi", &[], &[], &[], None, "test-model", CancellationToken::new())
            .await
            .unwrap();

        let texts = session.text_blocks_in_order();
        assert_eq!(texts, vec!["Hello world.".to_string()]);
    }

    #[tokio::test]
    async fn splits_into_new_block_at_heading_boundary() {
        let session = Session::new();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider {
            deltas: vec![
                StreamDelta::Text("Intro.".to_string()),
                StreamDelta::Text("\n## Details\nMore.".to_string()),
                StreamDelta::Done { stop_reason: Some("end_turn".to_string()), usage: None },
            ],
        });

        run(&session, &provider, "hi", &[], &[], &[], None, "test-model", CancellationToken::new())
            .await
            .unwrap();

        let texts = session.text_blocks_in_order();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "Intro.");
        assert_eq!(texts[1], "## Details\nMore.");
    }

    #[tokio::test]
    async fn stream_error_appends_note_and_fails_request() {
        let session = Session::new();
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider {
            deltas: vec![StreamDelta::Text("partial".to_string()), StreamDelta::Error("boom".to_string())],
        });

        let err = run(&session, &provider, "hi", &[], &[], &[], None, "test-model", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WriterFailed(_)));

        let texts = session.text_blocks_in_order();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("partial"));
        assert!(texts[0].contains("error generating"));
    }
}
