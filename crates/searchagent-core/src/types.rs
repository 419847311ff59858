//! Shared data model (§3): identifiers, chat turns, classifier/action/widget
//! outputs, and the final aggregate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Cheaply-cloneable session identifier, mirroring `agenticlaw-core::types::SessionKey`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Cheaply-cloneable block identifier, unique within a session.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct BlockId(Arc<str>);

impl BlockId {
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque per-user identifier used by admission control and the classifier's
/// (external, out-of-scope) personalization context. Derived from the
/// transport layer; never persisted beyond process memory.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct UserId(Arc<str>);

impl UserId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message in the conversation (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Optimization mode (§6, GLOSSARY): a coarse knob on research iteration cap.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    Speed,
    #[default]
    Balanced,
    Quality,
}

impl OptimizationMode {
    /// Default `maxIterations` per §4.6. Overridable via config (§6).
    pub fn default_max_iterations(self) -> usize {
        match self {
            OptimizationMode::Speed => 2,
            OptimizationMode::Balanced => 6,
            OptimizationMode::Quality => 25,
        }
    }
}

/// The closed set of routing flags the Classifier produces (§3, §4.3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierOutput {
    #[serde(default)]
    pub skip_search: bool,
    #[serde(default)]
    pub personal_search: bool,
    #[serde(default)]
    pub academic_search: bool,
    #[serde(default)]
    pub discussion_search: bool,
    #[serde(default)]
    pub show_weather_widget: bool,
    #[serde(default)]
    pub show_stock_widget: bool,
    #[serde(default)]
    pub show_calculation_widget: bool,
    #[serde(default)]
    pub show_product_widget: bool,
    #[serde(default)]
    pub show_hotel_widget: bool,
    #[serde(default)]
    pub show_place_widget: bool,
    #[serde(default)]
    pub show_movie_widget: bool,
    pub standalone_follow_up: String,
}

impl ClassifierOutput {
    /// The permissive fallback used when the classifier call fails (§4.3, §7):
    /// run web search, show no widgets.
    pub fn permissive_default(query: &str) -> Self {
        Self {
            skip_search: false,
            personal_search: false,
            academic_search: false,
            discussion_search: false,
            show_weather_widget: false,
            show_stock_widget: false,
            show_calculation_widget: false,
            show_product_widget: false,
            show_hotel_widget: false,
            show_place_widget: false,
            show_movie_widget: false,
            standalone_follow_up: query.to_string(),
        }
    }

    /// JSON schema used to constrain the structured classifier call.
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skipSearch": { "type": "boolean" },
                "personalSearch": { "type": "boolean" },
                "academicSearch": { "type": "boolean" },
                "discussionSearch": { "type": "boolean" },
                "showWeatherWidget": { "type": "boolean" },
                "showStockWidget": { "type": "boolean" },
                "showCalculationWidget": { "type": "boolean" },
                "showProductWidget": { "type": "boolean" },
                "showHotelWidget": { "type": "boolean" },
                "showPlaceWidget": { "type": "boolean" },
                "showMovieWidget": { "type": "boolean" },
                "standaloneFollowUp": { "type": "string" }
            },
            "required": [
                "skipSearch", "personalSearch", "academicSearch", "discussionSearch",
                "showWeatherWidget", "showStockWidget", "showCalculationWidget",
                "showProductWidget", "showHotelWidget", "showPlaceWidget",
                "showMovieWidget", "standaloneFollowUp"
            ]
        })
    }
}

/// A single retrieved document snippet (GLOSSARY: Chunk).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Chunk {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Output of a single action call (§3).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ActionOutput {
    pub name: String,
    pub tool_call_id: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ActionOutput {
    pub fn error(name: impl Into<String>, tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_call_id: tool_call_id.into(),
            is_error: true,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Rendered as the `tool` transcript message fed back to the research LLM.
    pub fn to_transcript_content(&self) -> String {
        if self.is_error {
            return format!("Error: {}", self.error_message.as_deref().unwrap_or("action failed"));
        }
        if self.chunks.is_empty() {
            return "(no results)".to_string();
        }
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {} ({})\n{}", i + 1, c.title, c.url, c.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Output of a single widget run (§3).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct WidgetOutput {
    #[serde(rename = "type")]
    pub widget_type: String,
    pub success: bool,
    #[serde(default)]
    pub cards: Vec<serde_json::Value>,
    #[serde(default)]
    pub llm_context: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The terminal aggregate carried by the `end` event (§3, §4.9).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FinalAggregate {
    pub answer: String,
    pub follow_up_suggestions: Vec<String>,
    pub sources: Vec<String>,
    pub images: Vec<String>,
    pub cards_by_domain: HashMap<String, Vec<serde_json::Value>>,
}
