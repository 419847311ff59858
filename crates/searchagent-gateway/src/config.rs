//! Gateway configuration (§6 External Interfaces: `modelConfig`, mode
//! overrides; ambient: bind/port/CORS), generalizing
//! `agenticlaw-core`'s `GatewayConfig`/`BindMode` pattern to an env-var-driven surface.

use searchagent_admission::AdmissionConfig;
use searchagent_agent::AgentConfig;
use std::time::Duration;

/// Bind mode, same two options and env-string mapping as
/// `agenticlaw-core::types::BindMode`.
#[derive(Clone, Copy, Debug, Default)]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(self) -> &'static str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }

    fn from_env_str(s: &str) -> Self {
        match s {
            "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
            _ => BindMode::Lan,
        }
    }
}

pub struct GatewayConfig {
    pub port: u16,
    pub bind: BindMode,
    pub cors_origin: Option<String>,
    pub anthropic_api_key: String,
    pub embedding_base_url: String,
    pub session_retention: Duration,
    pub heartbeat_interval: Duration,
    pub agent: AgentConfig,
    pub admission: AdmissionConfig,
}

impl GatewayConfig {
    /// Load from the environment (`SEARCHAGENT_*`), same parse-or-default
    /// convention as `AdmissionConfig::from_env`.
    pub fn from_env() -> anyhow::Result<Self> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;

        let mut agent = AgentConfig::default();
        if let Ok(model) = std::env::var("SEARCHAGENT_CHAT_MODEL") {
            agent.chat_model = model;
        }
        agent.follow_up_limit = env_parse("SEARCHAGENT_FOLLOW_UP_LIMIT", agent.follow_up_limit);
        agent.follow_up_max_len = env_parse("SEARCHAGENT_FOLLOW_UP_MAX_LEN", agent.follow_up_max_len);
        agent.follow_up_recent_k = env_parse("SEARCHAGENT_FOLLOW_UP_RECENT_K", agent.follow_up_recent_k);

        Ok(Self {
            port: env_parse("SEARCHAGENT_PORT", 8080),
            bind: std::env::var("SEARCHAGENT_BIND")
                .map(|s| BindMode::from_env_str(&s))
                .unwrap_or_default(),
            cors_origin: std::env::var("SEARCHAGENT_CORS_ORIGIN").ok(),
            embedding_base_url: std::env::var("SEARCHAGENT_EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/embeddings".to_string()),
            anthropic_api_key,
            session_retention: env_parse_secs("SEARCHAGENT_SESSION_RETENTION_SECS", Duration::from_secs(600)),
            heartbeat_interval: env_parse_secs("SEARCHAGENT_HEARTBEAT_SECS", Duration::from_secs(10)),
            agent,
            admission: AdmissionConfig::from_env(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_parse_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
}
