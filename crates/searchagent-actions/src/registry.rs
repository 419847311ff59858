//! The `Action` capability trait and registry (§4.5). The sibling of
//! `searchagent-widgets::Widget`: same three-method shape (applicability
//! predicate, executor, descriptor), generalized from `agenticlaw-tools`'s `Tool`
//! trait the same way, but exposed to the research loop's tool-calling LLM
//! instead of to the classifier's widget fan-out.

use async_trait::async_trait;
use futures::future::join_all;
use searchagent_core::{ActionOutput, ChatTurn, Chunk, ClassifierOutput, ToolCallDescriptor};
use searchagent_llm::LlmTool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ActionContext {
    pub params: serde_json::Value,
    pub history: Vec<ChatTurn>,
    pub abort: CancellationToken,
}

/// What a successful action call produced, before the registry wraps it into
/// the wire `ActionOutput` (which also carries `name`/`toolCallId`).
#[derive(Default)]
pub struct ActionOutcome {
    pub chunks: Vec<Chunk>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub done: bool,
}

/// A tool the research LLM may call (GLOSSARY: Action).
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameter_schema(&self) -> serde_json::Value;
    fn enabled_for(&self, classifier: &ClassifierOutput) -> bool;
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutcome, String>;
}

pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self { actions: HashMap::new() }
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        self.actions.insert(action.name().to_string(), Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn available_actions(&self, classifier: &ClassifierOutput) -> Vec<Arc<dyn Action>> {
        self.actions.values().filter(|a| a.enabled_for(classifier)).cloned().collect()
    }

    pub fn to_llm_tools(&self, classifier: &ClassifierOutput) -> Vec<LlmTool> {
        self.available_actions(classifier)
            .into_iter()
            .map(|a| LlmTool {
                name: a.name().to_string(),
                description: a.description().to_string(),
                input_schema: a.parameter_schema(),
            })
            .collect()
    }

    /// §4.5/§9: a tool call is "safe" iff its parameters parse against the
    /// action's schema. Manual structural validation (shallow: required
    /// top-level properties present with the declared JSON type) — the
    /// registry doesn't pull in a full JSON-Schema validator because neither
    /// `agenticlaw-tools` nor the rest of the retrieval pack does either.
    pub fn validate_call(&self, name: &str, params: &serde_json::Value) -> Result<(), String> {
        let action = self.actions.get(name).ok_or_else(|| format!("unknown action: {name}"))?;
        validate_against_schema(params, &action.parameter_schema())
    }

    /// Run every tool call concurrently; unknown names and schema-invalid
    /// calls become error-kind `ActionOutput`s rather than panicking or
    /// aborting peers (§4.5).
    pub async fn execute_all(
        &self,
        calls: Vec<ToolCallDescriptor>,
        history: &[ChatTurn],
        abort: CancellationToken,
    ) -> Vec<ActionOutput> {
        let futures = calls.into_iter().map(|call| {
            let history = history.to_vec();
            let abort = abort.clone();
            async move {
                let params: serde_json::Value = match serde_json::from_str(&call.arguments) {
                    Ok(v) => v,
                    Err(e) => return ActionOutput::error(&call.name, &call.id, format!("malformed arguments: {e}")),
                };

                let action = match self.actions.get(&call.name) {
                    Some(a) => a,
                    None => return ActionOutput::error(&call.name, &call.id, format!("unknown action: {}", call.name)),
                };

                if let Err(e) = validate_against_schema(&params, &action.parameter_schema()) {
                    return ActionOutput::error(&call.name, &call.id, format!("invalid parameters: {e}"));
                }

                let ctx = ActionContext { params, history, abort };
                match action.execute(ctx).await {
                    Ok(outcome) => ActionOutput {
                        name: call.name,
                        tool_call_id: call.id,
                        chunks: outcome.chunks,
                        images: outcome.images,
                        videos: outcome.videos,
                        done: outcome.done,
                        is_error: false,
                        error_message: None,
                    },
                    Err(message) => ActionOutput::error(&call.name, &call.id, message),
                }
            }
        });
        join_all(futures).await
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow structural check: every property named in `schema.required` is
/// present in `params` and, where `schema.properties.<name>.type` is one of
/// the JSON Schema primitive type names, its runtime type matches.
fn validate_against_schema(params: &serde_json::Value, schema: &serde_json::Value) -> Result<(), String> {
    let obj = params.as_object().ok_or("parameters must be a JSON object")?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let field = field.as_str().unwrap_or_default();
            if !obj.contains_key(field) {
                return Err(format!("missing required field: {field}"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(declared_type) = properties.get(key).and_then(|p| p.get("type")).and_then(|t| t.as_str()) else {
                continue;
            };
            if !json_type_matches(value, declared_type) {
                return Err(format!("field '{key}' does not match declared type '{declared_type}'"));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &serde_json::Value, declared: &str) -> bool {
    match declared {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
