//! Error taxonomy shared by every crate in the workspace.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    InputInvalid(String),

    #[error("admission denied: {reason}")]
    AdmissionDenied {
        reason: AdmissionDenialReason,
        retry_after_ms: Option<u64>,
    },

    #[error("widget error: {widget} - {message}")]
    WidgetFailed { widget: String, message: String },

    #[error("action error: {action} - {message}")]
    ActionFailed { action: String, message: String },

    #[error("writer error: {0}")]
    WriterFailed(String),

    #[error("aborted")]
    Aborted,

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why admission declined to admit a request (§4.2, §7).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenialReason {
    #[error("rate limited")]
    RateLimited,
    #[error("too many active requests for this user")]
    UserActiveLimit,
    #[error("queue full")]
    QueueFull,
    #[error("circuit open")]
    CircuitOpen,
}

impl Error {
    pub fn widget_failed(widget: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WidgetFailed {
            widget: widget.into(),
            message: message.into(),
        }
    }

    pub fn action_failed(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Error code used in the wire `error` event and in HTTP-boundary mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InputInvalid(_) => "input_invalid",
            Error::AdmissionDenied { reason, .. } => match reason {
                AdmissionDenialReason::RateLimited => "rate_limited",
                AdmissionDenialReason::UserActiveLimit => "user_active_limit",
                AdmissionDenialReason::QueueFull => "queue_full",
                AdmissionDenialReason::CircuitOpen => "circuit_open",
            },
            Error::WidgetFailed { .. } => "widget_failed",
            Error::ActionFailed { .. } => "action_failed",
            Error::WriterFailed(_) => "writer_failed",
            Error::Aborted => "aborted",
            Error::InternalInvariantViolation(_) => "internal_invariant_violation",
            Error::LlmError { .. } => "llm_error",
            Error::JsonError(_) => "json_error",
        }
    }

    /// HTTP status to use if this error occurs before the event stream opens.
    /// Once streaming has started, errors are always delivered in-band (§7).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InputInvalid(_) => 400,
            Error::AdmissionDenied { reason, .. } => match reason {
                AdmissionDenialReason::RateLimited => 429,
                _ => 503,
            },
            _ => 500,
        }
    }
}
