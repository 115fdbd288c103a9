//! HTTP adapter for the remote draft service.
//!
//! Request assembly and response parsing are pure functions over plain wire
//! structs so they can be tested without a socket. [`HttpDraftService`] wires
//! them to reqwest behind the [`DraftBackend`] trait, with one fixed deadline
//! around the whole call. Nothing here retries; retry is a conversation-level
//! decision.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::conversation::state::Turn;
use crate::document::RequirementsDoc;

/// Endpoint path appended to the configured base URL.
pub const DRAFT_CHAT_PATH: &str = "/v1/chat";

/// Fixed wall-clock budget for a single exchange, connect through body.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(45);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level outcomes of one exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The deadline elapsed before a complete response arrived.
    #[error("request exceeded the {}s deadline", REQUEST_DEADLINE.as_secs())]
    Timeout,

    /// Connection-level failure; the service never answered.
    #[error("network error: {0}")]
    Network(String),

    /// The body arrived but matched neither reply shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A non-success status other than the malformed-input case.
    #[error("service returned status {status}")]
    Http {
        /// The HTTP status code as received.
        status: u16,
    },
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// One reply from the service, already past shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelReply {
    /// The model wants more detail before drafting.
    Clarification {
        /// Questions to put to the user, never empty.
        questions: Vec<String>,
    },
    /// The model produced the finished document.
    Prd {
        /// The structured requirements document.
        prd: RequirementsDoc,
    },
}

/// Draft service request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireRequest {
    /// Fixed system instructions, sent on every call.
    pub system: String,
    /// Full ordered transcript.
    pub messages: Vec<WireMessage>,
    /// Optional instruction appended to the system prompt.
    #[serde(rename = "systemModifier", skip_serializing_if = "Option::is_none")]
    pub system_modifier: Option<String>,
}

/// One transcript entry in wire form.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireMessage {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Assemble the request body for one exchange.
///
/// The full transcript is sent every time; the service holds no state. The
/// modifier, when present, rides alongside the base instructions rather than
/// replacing them.
pub fn build_request(turns: &[Turn], system_modifier: Option<&str>) -> WireRequest {
    WireRequest {
        system: crate::prompt::SYSTEM_INSTRUCTIONS.to_owned(),
        messages: turns
            .iter()
            .map(|turn| WireMessage {
                role: turn.role.as_str().to_owned(),
                content: turn.content.clone(),
            })
            .collect(),
        system_modifier: system_modifier.map(str::to_owned),
    }
}

/// Parse and validate a response body.
///
/// Beyond the tagged-union shape this enforces only the two hard rules: a
/// clarification must carry at least one non-blank question, and a document
/// must carry a non-empty title. Everything else is the model's business.
///
/// # Errors
///
/// Returns [`CallError::Malformed`] when the body fails to decode or breaks
/// either rule.
pub fn parse_reply(body: &str) -> Result<ModelReply, CallError> {
    let reply: ModelReply = serde_json::from_str(body)
        .map_err(|e| CallError::Malformed(format!("undecodable reply: {e}")))?;

    match &reply {
        ModelReply::Clarification { questions } => {
            if questions.is_empty() || questions.iter().all(|q| q.trim().is_empty()) {
                return Err(CallError::Malformed(
                    "clarification carried no usable questions".to_owned(),
                ));
            }
        }
        ModelReply::Prd { prd } => {
            if prd.title.trim().is_empty() {
                return Err(CallError::Malformed("document title is empty".to_owned()));
            }
        }
    }

    Ok(reply)
}

// ---------------------------------------------------------------------------
// Backend trait and HTTP implementation
// ---------------------------------------------------------------------------

/// One round trip to the draft service.
///
/// The conversation driver depends on this trait, never on reqwest, so tests
/// substitute scripted backends.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Send the transcript (plus optional system modifier) and return the
    /// parsed reply.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] for timeouts, transport failures, non-success
    /// statuses, and undecodable bodies.
    async fn exchange(
        &self,
        turns: &[Turn],
        system_modifier: Option<&str>,
    ) -> Result<ModelReply, CallError>;
}

/// Production backend speaking JSON over HTTP with bearer auth.
pub struct HttpDraftService {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpDraftService {
    /// Build a backend against `base_url` (scheme and host, no trailing
    /// slash needed) using `api_key` as the bearer token.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, DRAFT_CHAT_PATH)
    }

    async fn perform(
        &self,
        turns: &[Turn],
        system_modifier: Option<&str>,
    ) -> Result<ModelReply, CallError> {
        let request = build_request(turns, system_modifier);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Timeout
                } else {
                    CallError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Network(e.to_string()))?;

        if status.is_success() {
            return parse_reply(&body);
        }

        let snippet = sanitize_error_body(&body);
        warn!(status = status.as_u16(), body = %snippet, "draft service returned an error");

        // 422 means the service understood us but rejected the payload; from
        // the conversation's point of view that reads the same as a garbled
        // reply, so it collapses into the malformed case here.
        if status.as_u16() == 422 {
            return Err(CallError::Malformed(snippet));
        }

        Err(CallError::Http {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl DraftBackend for HttpDraftService {
    async fn exchange(
        &self,
        turns: &[Turn],
        system_modifier: Option<&str>,
    ) -> Result<ModelReply, CallError> {
        let request_id = Uuid::new_v4();
        debug!(
            %request_id,
            turns = turns.len(),
            modifier = system_modifier.is_some(),
            "dispatching draft request"
        );

        let outcome = tokio::time::timeout(REQUEST_DEADLINE, self.perform(turns, system_modifier))
            .await
            .unwrap_or(Err(CallError::Timeout));

        if let Err(error) = &outcome {
            warn!(%request_id, error = %error, "draft request failed");
        } else {
            debug!(%request_id, "draft request succeeded");
        }
        outcome
    }
}

impl std::fmt::Debug for HttpDraftService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDraftService")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

fn sanitize_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-[A-Za-z0-9_\-]{10,}",
        r"(?i)bearer\s+[A-Za-z0-9_\-\.]{10,}",
        r"ds-[A-Za-z0-9]{20,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
