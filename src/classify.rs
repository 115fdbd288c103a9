//! Failure taxonomy and the transport-to-taxonomy classifier.
//!
//! A pure mapping with no state: every [`CallError`] the service adapter can
//! raise lands on exactly one [`FailureKind`], each with a fixed user-facing
//! message. Every kind is retryable — the remote service is assumed
//! transiently unreliable, never permanently rejecting.

use crate::service::CallError;

/// The closed set of conversation-level failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The 45-second request deadline expired.
    Timeout,
    /// The service answered 429.
    RateLimited,
    /// The service answered 5xx.
    ServerError,
    /// The service could not be reached at all.
    Network,
    /// The payload matched neither known response shape.
    MalformedResponse,
    /// Any other non-success status.
    Unknown,
}

impl FailureKind {
    /// Stable lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Network => "network",
            Self::MalformedResponse => "malformed_response",
            Self::Unknown => "unknown",
        }
    }
}

/// A classified failure, held only while the conversation is in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Which taxonomy member this is.
    pub kind: FailureKind,
    /// User-facing message.
    pub message: String,
    /// Whether `retry` is offered. Always true in the current taxonomy.
    pub retryable: bool,
}

/// Consecutive-failure count at which the message override kicks in.
pub const REPEATED_TROUBLE_THRESHOLD: u32 = 3;

/// Message shown from the third consecutive failure onward, regardless of kind.
pub const REPEATED_TROUBLE_MESSAGE: &str =
    "Still having trouble after several attempts. Wait a moment, then retry, or start over.";

/// Map a transport-level error to its conversation-level failure.
pub fn classify(error: &CallError) -> Failure {
    let (kind, message) = match error {
        CallError::Timeout => (
            FailureKind::Timeout,
            "The request timed out. The service may be busy — try again.",
        ),
        CallError::Network(_) => (
            FailureKind::Network,
            "Could not reach the draft service. Check your connection and retry.",
        ),
        CallError::Malformed(_) => (
            FailureKind::MalformedResponse,
            "The service returned something unreadable. Retrying will regenerate it.",
        ),
        CallError::Http { status: 429 } => (
            FailureKind::RateLimited,
            "Too many requests right now. Wait a moment before retrying.",
        ),
        CallError::Http { status } if (500..=599).contains(status) => (
            FailureKind::ServerError,
            "The draft service hit an internal error. Retrying usually fixes this.",
        ),
        CallError::Http { .. } => (
            FailureKind::Unknown,
            "Something unexpected went wrong. Retrying may help.",
        ),
    };

    Failure {
        kind,
        message: message.to_owned(),
        retryable: true,
    }
}
