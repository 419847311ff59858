//! Admission control parameters (§6 Configuration surface).

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Token-bucket capacity per user.
    pub rate_limit_capacity: u32,
    /// Token-bucket refill rate, tokens/sec.
    pub rate_limit_refill_per_sec: f64,
    /// Max concurrently active requests for a single user (M_user).
    pub max_active_per_user: usize,
    /// Max concurrently active requests process-wide before queueing (M_global).
    pub max_active_global: usize,
    /// Bounded queue capacity (Q_max).
    pub queue_capacity: usize,
    /// Circuit breaker: consecutive failures to trip (F).
    pub breaker_failure_threshold: u32,
    /// Circuit breaker: window over which failures are counted (W).
    pub breaker_window: Duration,
    /// Circuit breaker: cooldown before probing again (T).
    pub breaker_cooldown: Duration,
    /// Per-user conversation memory idle TTL (T_idle).
    pub stale_context_idle: Duration,
    /// How often the stale-context flusher sweeps.
    pub stale_context_sweep_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rate_limit_capacity: 20,
            rate_limit_refill_per_sec: 1.0,
            max_active_per_user: 3,
            max_active_global: 64,
            queue_capacity: 256,
            breaker_failure_threshold: 5,
            breaker_window: Duration::from_secs(30),
            breaker_cooldown: Duration::from_secs(30),
            stale_context_idle: Duration::from_secs(3600),
            stale_context_sweep_interval: Duration::from_secs(1800),
        }
    }
}

impl AdmissionConfig {
    /// Load from environment, falling back to defaults for unset vars,
    /// following the same `SEARCHAGENT_*`-prefixed, parse-or-default pattern
    /// the gateway uses for its own configuration.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rate_limit_capacity: env_parse("SEARCHAGENT_RATE_LIMIT_CAPACITY", defaults.rate_limit_capacity),
            rate_limit_refill_per_sec: env_parse(
                "SEARCHAGENT_RATE_LIMIT_REFILL_PER_SEC",
                defaults.rate_limit_refill_per_sec,
            ),
            max_active_per_user: env_parse("SEARCHAGENT_MAX_ACTIVE_PER_USER", defaults.max_active_per_user),
            max_active_global: env_parse("SEARCHAGENT_MAX_ACTIVE_GLOBAL", defaults.max_active_global),
            queue_capacity: env_parse("SEARCHAGENT_QUEUE_CAPACITY", defaults.queue_capacity),
            breaker_failure_threshold: env_parse(
                "SEARCHAGENT_BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_window: env_parse_secs("SEARCHAGENT_BREAKER_WINDOW_SECS", defaults.breaker_window),
            breaker_cooldown: env_parse_secs("SEARCHAGENT_BREAKER_COOLDOWN_SECS", defaults.breaker_cooldown),
            stale_context_idle: env_parse_secs("SEARCHAGENT_STALE_CONTEXT_IDLE_SECS", defaults.stale_context_idle),
            stale_context_sweep_interval: env_parse_secs(
                "SEARCHAGENT_STALE_CONTEXT_SWEEP_SECS",
                defaults.stale_context_sweep_interval,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_parse_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
