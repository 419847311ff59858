//! LLM provider abstractions: streaming completion, structured generation,
//! and embeddings, with an Anthropic-backed implementation.

pub mod anthropic;
pub mod provider;
pub mod types;

pub use anthropic::{AnthropicEmbeddingProvider, AnthropicProvider};
pub use provider::{classifier_request, EmbeddingProvider, LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;
