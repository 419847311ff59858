//! LLM provider capability traits: streaming completion, structured
//! (forced-tool-call) generation, and embeddings.

use crate::types::{LlmMessage, LlmRequest, LlmTool, StreamDelta, ToolChoice};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// Streaming completion capability, mirrored directly from
/// `agenticlaw-llm`'s single-method provider trait.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn models(&self) -> &[&str];

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| *m == model || model.starts_with(m))
    }

    /// Stream a completion. If `cancel` fires, the stream ends early with
    /// `LlmError::Cancelled` rather than running to completion (§4.9).
    async fn complete_stream(&self, request: LlmRequest, cancel: Option<CancellationToken>) -> LlmResult<LlmStream>;

    /// Non-streamed, schema-constrained generation (§4.3 Classifier, §4.8
    /// Follow-up Generator). The default implementation forces a single tool
    /// call named `respond` with `schema` as its input schema, drains the
    /// stream, and parses the accumulated tool arguments — the same
    /// forced-tool-choice technique the wire protocol already supports for
    /// research-loop tool calls, just aimed at one closed schema instead of
    /// the action registry.
    async fn generate_structured(
        &self,
        mut request: LlmRequest,
        schema: serde_json::Value,
    ) -> LlmResult<serde_json::Value> {
        const RESPOND_TOOL: &str = "respond";
        request.tools = Some(vec![LlmTool {
            name: RESPOND_TOOL.to_string(),
            description: "Provide the response in the given schema.".to_string(),
            input_schema: schema,
        }]);
        request.tool_choice = Some(ToolChoice::Tool {
            name: RESPOND_TOOL.to_string(),
        });

        let mut stream = self.complete_stream(request, None).await?;
        let mut arguments = String::new();
        let mut saw_tool_call = false;

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::ToolCallStart { name, .. } if name == RESPOND_TOOL => {
                    saw_tool_call = true;
                }
                StreamDelta::ToolCallDelta { arguments: partial, .. } => {
                    arguments.push_str(&partial);
                }
                StreamDelta::ToolCallEnd { .. } => break,
                StreamDelta::Error(message) => return Err(LlmError::StreamError(message)),
                _ => {}
            }
        }

        if !saw_tool_call {
            warn!("generate_structured: model did not call {RESPOND_TOOL}");
            return Err(LlmError::InvalidResponse(format!(
                "model did not invoke the forced {RESPOND_TOOL} tool"
            )));
        }

        serde_json::from_str(&arguments)
            .map_err(|e| LlmError::InvalidResponse(format!("structured output did not match schema: {e}")))
    }
}

/// Embedding capability used by `personal_search` (§4.5 supplement; the
/// `modelConfig.embeddingModel` identifier §3 mentions but leaves
/// unspecified).
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>>;
}

/// A message used purely to exercise `generate_structured`'s plumbing in
/// tests without a live provider.
pub fn classifier_request(system: impl Into<String>, query: impl Into<String>) -> LlmRequest {
    LlmRequest {
        system: Some(system.into()),
        messages: vec![LlmMessage::user(query)],
        max_tokens: Some(1024),
        ..Default::default()
    }
}
