//! The `Widget` capability trait and registry (§4.4, §9 REDESIGN FLAGS: the
//! duck-typed `shouldExecute` widgets become an explicit three-method
//! interface: applicability predicate, executor, descriptor).

use async_trait::async_trait;
use searchagent_core::{ChatTurn, ClassifierOutput, WidgetOutput};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context passed to a widget's `run`.
pub struct WidgetContext {
    pub query: String,
    pub history: Vec<ChatTurn>,
    pub abort: CancellationToken,
}

/// A domain-specialized data fetcher chosen by the classifier and executed in
/// parallel with research (GLOSSARY: Widget).
#[async_trait]
pub trait Widget: Send + Sync {
    /// Stable identifier, e.g. `"hotel"`. Matches the `showXWidget` flag name
    /// in `ClassifierOutput` minus the `show`/`Widget` wrapping.
    fn widget_type(&self) -> &str;

    /// Applicability predicate.
    fn should_run(&self, classifier: &ClassifierOutput, query: &str) -> bool;

    /// Execute; isolated per-widget failure is the executor's concern, not
    /// this method's — implementations may simply return `Err`.
    async fn run(&self, ctx: WidgetContext) -> Result<WidgetOutput, String>;
}

pub struct WidgetRegistry {
    widgets: Vec<Arc<dyn Widget>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self { widgets: Vec::new() }
    }

    pub fn register(&mut self, widget: impl Widget + 'static) {
        self.widgets.push(Arc::new(widget));
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// The subset of registered widgets whose `should_run` predicate holds.
    pub fn applicable(&self, classifier: &ClassifierOutput, query: &str) -> Vec<Arc<dyn Widget>> {
        self.widgets
            .iter()
            .filter(|w| w.should_run(classifier, query))
            .cloned()
            .collect()
    }
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
