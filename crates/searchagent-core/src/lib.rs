//! Shared types, error taxonomy, and the Session/Block streaming protocol
//! used by every crate in the workspace.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{AdmissionDenialReason, Error, Result};
pub use protocol::{
    append_text_patch, materialized_text, BlockKind, Session, SessionRegistry, WireEvent,
};
pub use types::*;
