//! Admission control: rate limiting, circuit breaking, per-user/global
//! concurrency gating, the bounded priority queue, and the stale-context
//! flusher background task.

pub mod circuit_breaker;
pub mod config;
pub mod controller;
pub mod flusher;
pub mod gate;
pub mod memory;
pub mod queue;
pub mod rate_limiter;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use config::AdmissionConfig;
pub use controller::{AdmissionController, Ticket};
pub use gate::ActiveGate;
pub use memory::ConversationMemory;
pub use queue::{PriorityQueue, RequestPriority};
pub use rate_limiter::RateLimiter;
