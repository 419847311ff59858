//! Classifier, Research Loop, Answer Writer, Follow-up Generator, and the
//! Orchestrator that wires them together (§4.3, §4.6-§4.9).

pub mod classifier;
pub mod followup;
pub mod orchestrator;
pub mod research;
pub mod resilience;
pub mod writer;

pub use orchestrator::{AgentConfig, RequestInput};
pub use resilience::BreakerGuardedProvider;
