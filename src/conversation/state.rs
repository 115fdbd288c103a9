//! Conversation state and its pure transitions.
//!
//! Every rule about lifecycle, rounds, retries, and snapshots lives here as
//! plain methods on an owned [`ConversationState`]. The methods perform no
//! I/O: operations that need a remote call return a [`Dispatch`] describing
//! it, and the driver feeds the result back through [`ConversationState::apply_reply`]
//! or [`ConversationState::apply_failure`]. That keeps the whole machine
//! testable without a backend in sight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{
    classify, Failure, FailureKind, REPEATED_TROUBLE_MESSAGE, REPEATED_TROUBLE_THRESHOLD,
};
use crate::document::RequirementsDoc;
use crate::prompt;
use crate::service::{CallError, ModelReply};

/// Maximum number of clarification rounds before generation is forced.
pub const CLARIFICATION_CAP: u32 = 5;

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person describing their product.
    User,
    /// The remote model.
    Assistant,
}

impl Role {
    /// Wire-format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Who authored it.
    pub role: Role,
    /// The text as sent or received, framing included.
    pub content: String,
    /// When the turn was appended.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Stamp a new turn with the current time.
    pub fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Where the conversation currently stands. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Lifecycle {
    /// Nothing sent yet, or reset.
    #[default]
    Idle,
    /// One request is in flight; every mutating operation is refused.
    AwaitingResponse,
    /// The model asked questions and is waiting on answers.
    AwaitingClarification,
    /// A document was produced. Stable until restart or regenerate.
    Complete,
    /// The last call failed. Stable until retry or restart.
    Failed,
}

impl Lifecycle {
    /// Stable name, matching the persisted spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingResponse => "awaitingResponse",
            Self::AwaitingClarification => "awaitingClarification",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A remote call the driver must now perform.
///
/// Produced by [`ConversationState::begin_send`] and
/// [`ConversationState::begin_retry`] after the state has already moved to
/// [`Lifecycle::AwaitingResponse`]. The transcript is a copy; the repair path
/// appends a turn here that is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Transcript to send, in order.
    pub turns: Vec<Turn>,
    /// Optional instruction appended to the system prompt.
    pub system_modifier: Option<String>,
}

/// The owned conversation value. All transitions go through its methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Current lifecycle state.
    pub lifecycle: Lifecycle,
    /// Transcript, append-only within a session.
    pub turns: Vec<Turn>,
    /// The finished document. Present iff `Complete`.
    pub document: Option<RequirementsDoc>,
    /// Clarification replies received this session.
    pub clarification_round: u32,
    /// First idea text, kept apart from the transcript so edit-and-regenerate
    /// can hand it back. Empty until the first accepted send.
    pub original_idea: String,
    /// Failure detail. Present iff `Failed`.
    pub failure: Option<Failure>,
    /// Failures since the last success. Drives the repeated-trouble override.
    pub consecutive_failures: u32,
    /// Whether the one automatic JSON-repair call has been spent this streak.
    pub repair_attempted: bool,
    /// Raw text of the most recent accepted send, for plain retry.
    pub last_sent_user_text: Option<String>,
}

impl ConversationState {
    /// Accept user text and move to `AwaitingResponse`.
    ///
    /// Returns `None` without touching anything when the text trims to
    /// nothing, when a request is already in flight, or when a finished
    /// document is still held. Otherwise clears any prior failure, frames the
    /// turn (idea wording until the model has spoken once, answer wording
    /// after), captures the original idea on the first turn, and hands back
    /// the call to perform.
    ///
    /// The system modifier is computed one round ahead of the stored counter:
    /// the round that would be reached if this reply asks questions again. At
    /// one below the cap the model is warned, at the cap it is told to
    /// generate no matter what.
    #[must_use]
    pub fn begin_send(&mut self, text: &str) -> Option<Dispatch> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if matches!(
            self.lifecycle,
            Lifecycle::AwaitingResponse | Lifecycle::Complete
        ) {
            return None;
        }

        self.failure = None;
        if self.turns.is_empty() {
            self.original_idea = trimmed.to_owned();
        }

        let framed = if self.has_assistant_turn() {
            prompt::frame_answer(trimmed)
        } else {
            prompt::frame_idea(trimmed)
        };
        self.turns.push(Turn::new(Role::User, framed));
        self.last_sent_user_text = Some(trimmed.to_owned());

        let next_round = self.clarification_round.saturating_add(1);
        let modifier = if next_round >= CLARIFICATION_CAP {
            Some(prompt::force_generation())
        } else if next_round >= CLARIFICATION_CAP.saturating_sub(1) {
            Some(prompt::cap_warning(next_round, CLARIFICATION_CAP))
        } else {
            None
        };

        self.lifecycle = Lifecycle::AwaitingResponse;
        Some(Dispatch {
            turns: self.turns.clone(),
            system_modifier: modifier,
        })
    }

    /// Retry after a failure.
    ///
    /// Returns `None` when nothing has ever been sent or a request is in
    /// flight. After a malformed response with the repair attempt still
    /// unspent, spends it: the dispatched transcript gains a trailing
    /// "valid JSON only" user turn that is never stored, so the visible
    /// history stays clean whatever comes back. Every other case re-runs
    /// [`ConversationState::begin_send`] with the last raw text, re-framing
    /// and modifier recomputation included.
    #[must_use]
    pub fn begin_retry(&mut self) -> Option<Dispatch> {
        if self.lifecycle == Lifecycle::AwaitingResponse {
            return None;
        }
        let last_sent = self.last_sent_user_text.clone()?;

        let wants_repair = self
            .failure
            .as_ref()
            .is_some_and(|f| f.kind == FailureKind::MalformedResponse)
            && !self.repair_attempted;

        if wants_repair {
            self.repair_attempted = true;
            self.failure = None;
            self.lifecycle = Lifecycle::AwaitingResponse;

            let mut transcript = self.turns.clone();
            transcript.push(Turn::new(Role::User, prompt::json_repair_notice()));
            return Some(Dispatch {
                turns: transcript,
                system_modifier: None,
            });
        }

        self.begin_send(&last_sent)
    }

    /// Apply a successful reply and leave `AwaitingResponse`.
    ///
    /// A clarification appends one assistant turn (questions joined by a
    /// blank line) and advances the round; a document is stored verbatim with
    /// no assistant turn, the document itself being the deliverable. Either
    /// way the failure streak and the repair flag reset.
    pub fn apply_reply(&mut self, reply: ModelReply) {
        match reply {
            ModelReply::Clarification { questions } => {
                self.turns
                    .push(Turn::new(Role::Assistant, questions.join("\n\n")));
                self.clarification_round = self.clarification_round.saturating_add(1);
                self.lifecycle = Lifecycle::AwaitingClarification;
            }
            ModelReply::Prd { prd } => {
                self.document = Some(prd);
                self.lifecycle = Lifecycle::Complete;
            }
        }
        self.consecutive_failures = 0;
        self.repair_attempted = false;
    }

    /// Apply a failed call and move to `Failed`.
    ///
    /// From the third consecutive failure onward the message is replaced with
    /// the fixed repeated-trouble notice; kind and retryability stay intact
    /// for programmatic checks.
    pub fn apply_failure(&mut self, error: &CallError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let mut failure = classify(error);
        if self.consecutive_failures >= REPEATED_TROUBLE_THRESHOLD {
            failure.message = REPEATED_TROUBLE_MESSAGE.to_owned();
        }

        self.failure = Some(failure);
        self.lifecycle = Lifecycle::Failed;
    }

    /// Reset every field to its default. Always succeeds, from any state.
    pub fn start_over(&mut self) {
        *self = Self::default();
    }

    /// From `Complete`, reset everything except the original idea so the
    /// caller can pre-fill the input with it. A no-op from any other state.
    pub fn edit_and_regenerate(&mut self) {
        if self.lifecycle != Lifecycle::Complete {
            return;
        }
        let idea = std::mem::take(&mut self.original_idea);
        *self = Self {
            original_idea: idea,
            ..Self::default()
        };
    }

    fn has_assistant_turn(&self) -> bool {
        self.turns.iter().any(|t| t.role == Role::Assistant)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// The durable projection of a conversation.
///
/// Retry bookkeeping and failure detail are deliberately absent; neither
/// survives a reload. `AwaitingResponse` and `Failed` collapse to `Idle` when
/// the snapshot is taken, since no in-flight request and no failure detail
/// would back them after a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Lifecycle at capture time, transient states collapsed to idle.
    pub lifecycle_state: Lifecycle,
    /// Transcript.
    pub turns: Vec<Turn>,
    /// Finished document, when one exists.
    pub document: Option<RequirementsDoc>,
    /// Clarification replies received.
    pub clarification_round: u32,
    /// First idea text.
    pub original_idea: String,
}

impl ConversationState {
    /// Capture the durable projection of this state.
    pub fn snapshot(&self) -> PersistedSnapshot {
        let lifecycle_state = match self.lifecycle {
            Lifecycle::AwaitingResponse | Lifecycle::Failed => Lifecycle::Idle,
            other => other,
        };
        PersistedSnapshot {
            lifecycle_state,
            turns: self.turns.clone(),
            document: self.document.clone(),
            clarification_round: self.clarification_round,
            original_idea: self.original_idea.clone(),
        }
    }

    /// Rebuild a conversation from a stored snapshot.
    ///
    /// Transient lifecycle values are collapsed to idle even if an old store
    /// carries them. A snapshot whose lifecycle and document contradict each
    /// other (complete without a document, or a document outside complete) is
    /// treated as no prior session at all.
    pub fn from_snapshot(snapshot: PersistedSnapshot) -> Self {
        let lifecycle = match snapshot.lifecycle_state {
            Lifecycle::AwaitingResponse | Lifecycle::Failed => Lifecycle::Idle,
            other => other,
        };

        if (lifecycle == Lifecycle::Complete) != snapshot.document.is_some() {
            return Self::default();
        }

        Self {
            lifecycle,
            turns: snapshot.turns,
            document: snapshot.document,
            clarification_round: snapshot.clarification_round,
            original_idea: snapshot.original_idea,
            ..Self::default()
        }
    }
}
