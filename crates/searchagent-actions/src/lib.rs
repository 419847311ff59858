//! Action capability trait, registry with safe-call filtering, the pluggable
//! search backend, and the reference action set.

pub mod backend;
pub mod builtins;
pub mod registry;

pub use backend::{MockSearchBackend, SearchBackend};
pub use builtins::{AcademicSearchAction, DiscussionSearchAction, DoneAction, PersonalSearchAction, WebSearchAction};
pub use registry::{Action, ActionContext, ActionOutcome, ActionRegistry};

use searchagent_llm::EmbeddingProvider;
use std::sync::Arc;

/// Registers the full reference action set, matching the
/// `searchagent_widgets::default_registry()` convention.
pub fn default_registry(embeddings: Arc<dyn EmbeddingProvider>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(WebSearchAction::new(Arc::new(MockSearchBackend::new("web"))));
    registry.register(AcademicSearchAction::new(Arc::new(MockSearchBackend::new("academic"))));
    registry.register(DiscussionSearchAction::new(Arc::new(MockSearchBackend::new("discussion"))));
    registry.register(PersonalSearchAction::new(embeddings));
    registry.register(DoneAction);
    registry
}
