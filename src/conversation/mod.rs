//! Conversation driver: the owned state machine wired to a backend and a
//! snapshot store.
//!
//! [`Conversation`] holds the only mutable [`ConversationState`] and exposes
//! the four operations the presentation layer may trigger. Transitions are
//! computed by the pure methods in [`state`]; this module performs the side
//! effects they call for (the remote exchange, the snapshot writes) and feeds
//! outcomes back in. Single-flight is structural: operations take `&mut self`
//! and the state refuses to start a call while one is outstanding.

pub mod state;
pub mod store;

use std::sync::Arc;

use tracing::{info, warn};

use crate::service::DraftBackend;

use self::state::{ConversationState, Dispatch, Lifecycle};
use self::store::SnapshotStore;

/// A requirements-drafting conversation.
pub struct Conversation {
    state: ConversationState,
    backend: Arc<dyn DraftBackend>,
    store: Arc<dyn SnapshotStore>,
}

impl Conversation {
    /// Start a fresh conversation.
    pub fn new(backend: Arc<dyn DraftBackend>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            state: ConversationState::default(),
            backend,
            store,
        }
    }

    /// Start from whatever the store holds, or fresh when it holds nothing
    /// usable. Transient lifecycle states collapse to idle on the way in.
    pub async fn restore(backend: Arc<dyn DraftBackend>, store: Arc<dyn SnapshotStore>) -> Self {
        let state = match store.load().await {
            Some(snapshot) => ConversationState::from_snapshot(snapshot),
            None => ConversationState::default(),
        };
        info!(
            state = state.lifecycle.as_str(),
            turns = state.turns.len(),
            round = state.clarification_round,
            "conversation restored"
        );
        Self {
            state,
            backend,
            store,
        }
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Send user text and wait for the reply.
    ///
    /// A no-op on blank text, while a request is in flight, or while a
    /// finished document is held. The snapshot is written once the turn is
    /// accepted (so it survives a reload even if the process dies mid-call)
    /// and again after the outcome lands.
    pub async fn send(&mut self, text: &str) {
        let Some(dispatch) = self.state.begin_send(text) else {
            return;
        };
        self.persist().await;
        self.run(dispatch).await;
    }

    /// Retry after a failure: one automatic JSON-repair call when a malformed
    /// response has not yet been repaired, otherwise a full re-send of the
    /// last user text. A no-op when nothing has been sent.
    pub async fn retry(&mut self) {
        let Some(dispatch) = self.state.begin_retry() else {
            return;
        };
        self.persist().await;
        self.run(dispatch).await;
    }

    /// Drop everything, including the persisted snapshot.
    pub async fn start_over(&mut self) {
        self.state.start_over();
        self.store.clear().await;
        info!("conversation reset");
    }

    /// From `Complete`, reset for another pass over the same idea. The idea
    /// text stays available through [`ConversationState::original_idea`].
    pub async fn edit_and_regenerate(&mut self) {
        if self.state.lifecycle != Lifecycle::Complete {
            return;
        }
        self.state.edit_and_regenerate();
        self.persist().await;
        info!("conversation reset for regeneration");
    }

    async fn run(&mut self, dispatch: Dispatch) {
        info!(
            turns = dispatch.turns.len(),
            modifier = dispatch.system_modifier.is_some(),
            "dispatching conversation turn"
        );

        match self
            .backend
            .exchange(&dispatch.turns, dispatch.system_modifier.as_deref())
            .await
        {
            Ok(reply) => self.state.apply_reply(reply),
            Err(error) => {
                warn!(error = %error, "conversation turn failed");
                self.state.apply_failure(&error);
            }
        }

        info!(
            state = self.state.lifecycle.as_str(),
            round = self.state.clarification_round,
            failures = self.state.consecutive_failures,
            "conversation advanced"
        );
        self.persist().await;
    }

    async fn persist(&self) {
        self.store.save(&self.state.snapshot()).await;
    }
}
