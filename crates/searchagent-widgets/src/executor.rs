//! Concurrent, as-completed widget executor (§4.4): applicable widgets run
//! in parallel; each completion immediately emits its `block` event rather
//! than waiting for the whole batch (§4.4: "not batched").

use crate::registry::{WidgetContext, WidgetRegistry};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use searchagent_core::{BlockKind, ChatTurn, ClassifierOutput, Session, WidgetOutput};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Copy, Debug)]
pub struct WidgetExecutorConfig {
    pub per_widget_timeout: Duration,
}

impl Default for WidgetExecutorConfig {
    fn default() -> Self {
        Self { per_widget_timeout: Duration::from_secs(8) }
    }
}

/// Run every applicable widget concurrently, emitting a `block` event as each
/// one resolves. Returns every widget's output (successful or not) for the
/// orchestrator's `cardsByDomain`/`sources` aggregation.
pub async fn execute_all(
    session: &Session,
    registry: &WidgetRegistry,
    classifier: &ClassifierOutput,
    query: &str,
    history: &[ChatTurn],
    abort: CancellationToken,
    config: WidgetExecutorConfig,
) -> Vec<WidgetOutput> {
    let applicable = registry.applicable(classifier, query);

    let mut in_flight = FuturesUnordered::new();
    for widget in applicable {
        let ctx = WidgetContext {
            query: query.to_string(),
            history: history.to_vec(),
            abort: abort.clone(),
        };
        let timeout = config.per_widget_timeout;
        in_flight.push(async move {
            let widget_type = widget.widget_type().to_string();
            let outcome = tokio::select! {
                result = tokio::time::timeout(timeout, widget.run(ctx)) => result,
                _ = abort.cancelled() => Ok(Err("aborted".to_string())),
            };
            match outcome {
                Ok(Ok(output)) => output,
                Ok(Err(message)) => {
                    warn!("widget '{widget_type}' failed: {message}");
                    WidgetOutput {
                        widget_type,
                        success: false,
                        cards: Vec::new(),
                        llm_context: String::new(),
                        error_message: Some(message),
                    }
                }
                Err(_) => {
                    warn!("widget '{widget_type}' timed out after {timeout:?}");
                    WidgetOutput {
                        widget_type,
                        success: false,
                        cards: Vec::new(),
                        llm_context: String::new(),
                        error_message: Some("timed out".to_string()),
                    }
                }
            }
        });
    }

    let mut outputs = Vec::new();
    while let Some(output) = in_flight.next().await {
        let value = serde_json::json!({
            "widgetType": output.widget_type,
            "cards": output.cards,
            "success": output.success,
            "errorMessage": output.error_message,
        });
        if let Err(e) = session.emit_block(BlockKind::Widget, value) {
            warn!("failed to emit widget block for '{}': {e}", output.widget_type);
        }
        outputs.push(output);
    }
    outputs
}
