//! Pluggable search backend (grounded on `searchagent_llm::AnthropicProvider`'s
//! `reqwest`-based HTTP pattern: a thin trait in front of whatever actually
//! answers the query, so the web/academic/discussion actions below don't each
//! hardcode a provider). §1 puts the real search indices out of scope, so the
//! default implementation is an in-memory stand-in.

use async_trait::async_trait;
use searchagent_core::Chunk;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Chunk>, String>;
}

/// Deterministic stand-in backend: synthesizes a handful of chunks that
/// reference the query so the research loop has real transcript content to
/// reason over without depending on network access.
pub struct MockSearchBackend {
    domain: &'static str,
    result_count: usize,
}

impl MockSearchBackend {
    pub fn new(domain: &'static str) -> Self {
        Self { domain, result_count: 3 }
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(&self, query: &str) -> Result<Vec<Chunk>, String> {
        if query.trim().is_empty() {
            return Err("empty query".to_string());
        }
        Ok((1..=self.result_count)
            .map(|i| Chunk {
                title: format!("{} result {i} for \"{query}\"", self.domain),
                url: format!("https://{}.example/search?q={}&r={i}", self.domain, urlencode(query)),
                content: format!("Synthesized {} excerpt discussing {query}.", self.domain),
                metadata: serde_json::json!({ "domain": self.domain, "rank": i }),
            })
            .collect())
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}
