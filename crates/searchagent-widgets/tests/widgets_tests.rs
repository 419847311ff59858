//! Tests for the widget registry, concurrent executor, and reference widgets.

use async_trait::async_trait;
use searchagent_core::{BlockKind, ClassifierOutput, Session, WidgetOutput};
use searchagent_widgets::{default_registry, execute_all, Widget, WidgetContext, WidgetExecutorConfig, WidgetRegistry};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn classifier_with(mutator: impl FnOnce(&mut ClassifierOutput)) -> ClassifierOutput {
    let mut out = ClassifierOutput::permissive_default("query");
    mutator(&mut out);
    out
}

#[test]
fn default_registry_has_seven_widgets() {
    assert_eq!(default_registry().len(), 7);
}

#[test]
fn registry_applicable_filters_by_should_run() {
    let registry = default_registry();
    let classifier = classifier_with(|c| c.show_weather_widget = true);
    let applicable = registry.applicable(&classifier, "weather in Paris");
    assert_eq!(applicable.len(), 1);
    assert_eq!(applicable[0].widget_type(), "weather");
}

#[test]
fn registry_applicable_empty_when_no_flags_set() {
    let registry = default_registry();
    let classifier = ClassifierOutput::permissive_default("hi");
    assert!(registry.applicable(&classifier, "hi").is_empty());
}

#[tokio::test]
async fn calculator_widget_evaluates_expression() {
    let widget = searchagent_widgets::CalculatorWidget;
    let ctx = WidgetContext {
        query: "what is 6 * 7".to_string(),
        history: vec![],
        abort: CancellationToken::new(),
    };
    let output = widget.run(ctx).await.unwrap();
    assert!(output.success);
    assert_eq!(output.cards[0]["result"], 42.0);
}

#[tokio::test]
async fn calculator_widget_errors_without_expression() {
    let widget = searchagent_widgets::CalculatorWidget;
    let ctx = WidgetContext {
        query: "what's the capital of France".to_string(),
        history: vec![],
        abort: CancellationToken::new(),
    };
    assert!(widget.run(ctx).await.is_err());
}

struct SlowWidget;

#[async_trait]
impl Widget for SlowWidget {
    fn widget_type(&self) -> &str {
        "slow"
    }
    fn should_run(&self, _classifier: &ClassifierOutput, _query: &str) -> bool {
        true
    }
    async fn run(&self, _ctx: WidgetContext) -> Result<WidgetOutput, String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!()
    }
}

struct FailingWidget;

#[async_trait]
impl Widget for FailingWidget {
    fn widget_type(&self) -> &str {
        "failing"
    }
    fn should_run(&self, _classifier: &ClassifierOutput, _query: &str) -> bool {
        true
    }
    async fn run(&self, _ctx: WidgetContext) -> Result<WidgetOutput, String> {
        Err("backend unavailable".to_string())
    }
}

#[tokio::test]
async fn executor_isolates_timeout_and_other_widget_failures() {
    let mut registry = WidgetRegistry::new();
    registry.register(SlowWidget);
    registry.register(FailingWidget);
    registry.register(searchagent_widgets::CalculatorWidget);

    let session = Session::new();
    let classifier = classifier_with(|c| c.show_calculation_widget = true);
    let config = WidgetExecutorConfig { per_widget_timeout: Duration::from_millis(30) };

    let outputs = execute_all(
        &session,
        &registry,
        &classifier,
        "2 + 2",
        &[],
        CancellationToken::new(),
        config,
    )
    .await;

    assert_eq!(outputs.len(), 3);
    let slow = outputs.iter().find(|o| o.widget_type == "slow").unwrap();
    assert!(!slow.success);
    let failing = outputs.iter().find(|o| o.widget_type == "failing").unwrap();
    assert!(!failing.success);
    assert_eq!(failing.error_message.as_deref(), Some("backend unavailable"));
    let calc = outputs.iter().find(|o| o.widget_type == "calculator").unwrap();
    assert!(calc.success);
}

#[tokio::test]
async fn executor_emits_one_block_per_widget() {
    let mut registry = WidgetRegistry::new();
    registry.register(searchagent_widgets::WeatherWidget);
    registry.register(searchagent_widgets::StockWidget);

    let session = Session::new();
    let classifier = classifier_with(|c| {
        c.show_weather_widget = true;
        c.show_stock_widget = true;
    });

    let _ = execute_all(
        &session,
        &registry,
        &classifier,
        "AAPL and weather",
        &[],
        CancellationToken::new(),
        WidgetExecutorConfig::default(),
    )
    .await;

    assert_eq!(session.event_log_len(), 2);
}

#[tokio::test]
async fn widget_block_kind_is_stable() {
    let session = Session::new();
    let id = session.emit_block(BlockKind::Widget, serde_json::json!({"widgetType": "hotel", "cards": []})).unwrap();
    assert!(session.block_value(&id).is_some());
}
