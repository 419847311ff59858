//! Tests for action registry safe-call filtering, concurrent execution, and
//! the reference action set.

use async_trait::async_trait;
use searchagent_actions::{default_registry, Action, ActionContext, ActionRegistry, DoneAction};
use searchagent_core::{ChatRole, ChatTurn, ClassifierOutput, ToolCallDescriptor};
use searchagent_llm::{EmbeddingProvider, LlmResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct FixedEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FixedEmbeddingProvider {
    fn name(&self) -> &str {
        "fixed"
    }
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0])
    }
}

fn turn(role: ChatRole, content: &str) -> ChatTurn {
    ChatTurn { role, content: content.to_string(), tool_call: None, tool_call_id: None }
}

#[test]
fn default_registry_has_five_actions() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let classifier = ClassifierOutput::permissive_default("q");
    // web_search and done are unconditionally enabled under the permissive default.
    let names: Vec<&str> = registry.available_actions(&classifier).iter().map(|a| a.name()).collect::<Vec<_>>();
    assert!(names.contains(&"web_search"));
    assert!(names.contains(&"done"));
    assert!(!names.contains(&"academic_search"));
}

#[test]
fn available_actions_respect_classifier_flags() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let mut classifier = ClassifierOutput::permissive_default("q");
    classifier.academic_search = true;
    classifier.skip_search = true;
    let names: Vec<&str> = registry.available_actions(&classifier).iter().map(|a| a.name()).collect::<Vec<_>>();
    assert!(names.contains(&"academic_search"));
    assert!(!names.contains(&"web_search"));
}

#[test]
fn validate_call_rejects_missing_required_field() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let err = registry.validate_call("web_search", &serde_json::json!({})).unwrap_err();
    assert!(err.contains("queries"));
}

#[test]
fn validate_call_rejects_wrong_type() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let err = registry.validate_call("web_search", &serde_json::json!({ "queries": "not an array" })).unwrap_err();
    assert!(err.contains("queries"));
}

#[test]
fn validate_call_accepts_well_formed_params() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    assert!(registry.validate_call("web_search", &serde_json::json!({ "queries": ["hello"] })).is_ok());
}

#[test]
fn validate_call_unknown_action_is_an_error() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    assert!(registry.validate_call("nonexistent", &serde_json::json!({})).is_err());
}

#[tokio::test]
async fn execute_all_isolates_unknown_action_name() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let calls = vec![
        ToolCallDescriptor { id: "1".into(), name: "does_not_exist".into(), arguments: "{}".into() },
        ToolCallDescriptor { id: "2".into(), name: "web_search".into(), arguments: r#"{"queries":["rust"]}"#.into() },
    ];
    let outputs = registry.execute_all(calls, &[], CancellationToken::new()).await;
    assert_eq!(outputs.len(), 2);
    let unknown = outputs.iter().find(|o| o.tool_call_id == "1").unwrap();
    assert!(unknown.is_error);
    assert!(unknown.error_message.as_ref().unwrap().contains("unknown action"));
    let web = outputs.iter().find(|o| o.tool_call_id == "2").unwrap();
    assert!(!web.is_error);
    assert_eq!(web.chunks.len(), 3);
}

#[tokio::test]
async fn execute_all_isolates_malformed_arguments_from_peers() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let calls = vec![
        ToolCallDescriptor { id: "1".into(), name: "web_search".into(), arguments: "not json".into() },
        ToolCallDescriptor { id: "2".into(), name: "done".into(), arguments: "{}".into() },
    ];
    let outputs = registry.execute_all(calls, &[], CancellationToken::new()).await;
    let malformed = outputs.iter().find(|o| o.tool_call_id == "1").unwrap();
    assert!(malformed.is_error);
    let done = outputs.iter().find(|o| o.tool_call_id == "2").unwrap();
    assert!(!done.is_error);
    assert!(done.done);
}

#[tokio::test]
async fn execute_all_isolates_schema_invalid_params_from_peers() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let calls = vec![
        ToolCallDescriptor { id: "1".into(), name: "web_search".into(), arguments: "{}".into() },
        ToolCallDescriptor { id: "2".into(), name: "web_search".into(), arguments: r#"{"queries":["ok"]}"#.into() },
    ];
    let outputs = registry.execute_all(calls, &[], CancellationToken::new()).await;
    let invalid = outputs.iter().find(|o| o.tool_call_id == "1").unwrap();
    assert!(invalid.is_error);
    assert!(invalid.error_message.as_ref().unwrap().contains("invalid parameters"));
    let valid = outputs.iter().find(|o| o.tool_call_id == "2").unwrap();
    assert!(!valid.is_error);
}

#[tokio::test]
async fn personal_search_ranks_history_by_similarity() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let action = registry.get("personal_search").unwrap();
    let ctx = ActionContext {
        params: serde_json::json!({ "query": "ab" }),
        history: vec![turn(ChatRole::User, "a"), turn(ChatRole::User, "ab")],
        abort: CancellationToken::new(),
    };
    let outcome = action.execute(ctx).await.unwrap();
    assert_eq!(outcome.chunks.len(), 2);
}

#[tokio::test]
async fn personal_search_with_empty_history_returns_no_chunks() {
    let registry = default_registry(Arc::new(FixedEmbeddingProvider));
    let action = registry.get("personal_search").unwrap();
    let ctx = ActionContext {
        params: serde_json::json!({ "query": "ab" }),
        history: vec![],
        abort: CancellationToken::new(),
    };
    let outcome = action.execute(ctx).await.unwrap();
    assert!(outcome.chunks.is_empty());
}

#[tokio::test]
async fn done_action_is_always_enabled() {
    let classifier = ClassifierOutput::permissive_default("q");
    assert!(DoneAction.enabled_for(&classifier));
}

#[tokio::test]
async fn registry_without_actions_produces_empty_tool_list() {
    let registry = ActionRegistry::new();
    let classifier = ClassifierOutput::permissive_default("q");
    assert!(registry.to_llm_tools(&classifier).is_empty());
    let outcome: Vec<_> = registry
        .execute_all(vec![ToolCallDescriptor { id: "1".into(), name: "done".into(), arguments: "{}".into() }], &[], CancellationToken::new())
        .await;
    assert!(outcome[0].is_error);
}
