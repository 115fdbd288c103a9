//! Snapshot persistence: reload survival, transient-state collapse, and the
//! write-twice-per-send discipline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use draftsmith::conversation::state::{Lifecycle, PersistedSnapshot, Role, Turn};
use draftsmith::conversation::store::{MemoryStore, SnapshotStore, SqliteStore};
use draftsmith::conversation::Conversation;
use draftsmith::document::{Feature, RequirementsDoc, RoadmapPhase, UserStory};
use draftsmith::service::{CallError, DraftBackend, ModelReply};

fn sample_doc() -> RequirementsDoc {
    RequirementsDoc {
        title: "Dog Doorbell".to_owned(),
        summary: "A doorbell dogs can ring.".to_owned(),
        problem_statement: "Dogs cannot ask to go outside.".to_owned(),
        target_users: "Dog owners.".to_owned(),
        features: vec![Feature {
            name: "Paw pad".to_owned(),
            description: "Floor button sized for a paw.".to_owned(),
        }],
        functional_requirements: vec!["Chime on press".to_owned()],
        non_functional_requirements: vec!["Battery lasts a month".to_owned()],
        user_stories: vec![UserStory {
            story: "As an owner I hear when my dog wants out.".to_owned(),
            acceptance_criteria: vec!["Chime audible in the next room".to_owned()],
        }],
        out_of_scope: vec!["Cat support".to_owned()],
        technical_considerations: vec!["Capacitive sensing".to_owned()],
        roadmap: vec![RoadmapPhase {
            name: "MVP".to_owned(),
            items: vec!["Single chime".to_owned()],
        }],
        assumptions: Vec::new(),
    }
}

/// Answers every call with one clarification question.
struct ClarifyBackend {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl DraftBackend for ClarifyBackend {
    async fn exchange(
        &self,
        _turns: &[Turn],
        _system_modifier: Option<&str>,
    ) -> Result<ModelReply, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelReply::Clarification {
            questions: vec!["Who is it for?".to_owned()],
        })
    }
}

fn clarify_backend() -> Arc<ClarifyBackend> {
    Arc::new(ClarifyBackend {
        calls: Arc::new(AtomicU32::new(0)),
    })
}

/// Records the lifecycle of every snapshot it is asked to save.
struct RecordingStore {
    saved: Arc<Mutex<Vec<Lifecycle>>>,
    current: Mutex<Option<PersistedSnapshot>>,
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    async fn load(&self) -> Option<PersistedSnapshot> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    async fn save(&self, snapshot: &PersistedSnapshot) {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(snapshot.lifecycle_state);
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(snapshot.clone());
        }
    }

    async fn clear(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

#[tokio::test]
async fn conversation_survives_a_reload_through_sqlite() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let path = dir.path().join("snapshots.db");

    let store = SqliteStore::open(&path).await.expect("store should open");
    let mut conversation = Conversation::new(clarify_backend(), Arc::new(store));
    conversation.send("a doorbell for dogs").await;
    drop(conversation);

    let reopened = SqliteStore::open(&path).await.expect("store should reopen");
    let restored = Conversation::restore(clarify_backend(), Arc::new(reopened)).await;

    let state = restored.state();
    assert_eq!(state.lifecycle, Lifecycle::AwaitingClarification);
    assert_eq!(state.turns.len(), 2);
    assert_eq!(state.clarification_round, 1);
    assert_eq!(state.original_idea, "a doorbell for dogs");
}

#[tokio::test]
async fn interrupted_send_restores_as_idle() {
    let store = Arc::new(MemoryStore::default());
    store
        .save(&PersistedSnapshot {
            lifecycle_state: Lifecycle::AwaitingResponse,
            turns: vec![Turn::new(Role::User, "framed idea".to_owned())],
            document: None,
            clarification_round: 0,
            original_idea: "idea".to_owned(),
        })
        .await;

    let restored = Conversation::restore(clarify_backend(), store).await;

    let state = restored.state();
    assert_eq!(state.lifecycle, Lifecycle::Idle);
    assert_eq!(state.turns.len(), 1);
    assert_eq!(state.original_idea, "idea");
}

#[tokio::test]
async fn failed_snapshot_restores_as_idle() {
    let store = Arc::new(MemoryStore::default());
    store
        .save(&PersistedSnapshot {
            lifecycle_state: Lifecycle::Failed,
            turns: vec![Turn::new(Role::User, "framed idea".to_owned())],
            document: None,
            clarification_round: 1,
            original_idea: "idea".to_owned(),
        })
        .await;

    let restored = Conversation::restore(clarify_backend(), store).await;

    assert_eq!(restored.state().lifecycle, Lifecycle::Idle);
    assert_eq!(restored.state().clarification_round, 1);
}

#[tokio::test]
async fn inconsistent_snapshots_reset_to_fresh() {
    // Complete without a document.
    let store = Arc::new(MemoryStore::default());
    store
        .save(&PersistedSnapshot {
            lifecycle_state: Lifecycle::Complete,
            turns: vec![Turn::new(Role::User, "framed idea".to_owned())],
            document: None,
            clarification_round: 2,
            original_idea: "idea".to_owned(),
        })
        .await;

    let restored = Conversation::restore(clarify_backend(), store).await;
    assert_eq!(restored.state().lifecycle, Lifecycle::Idle);
    assert!(restored.state().turns.is_empty());
    assert!(restored.state().original_idea.is_empty());

    // A document outside Complete.
    let store = Arc::new(MemoryStore::default());
    store
        .save(&PersistedSnapshot {
            lifecycle_state: Lifecycle::Idle,
            turns: Vec::new(),
            document: Some(sample_doc()),
            clarification_round: 0,
            original_idea: "idea".to_owned(),
        })
        .await;

    let restored = Conversation::restore(clarify_backend(), store).await;
    assert!(restored.state().document.is_none());
    assert!(restored.state().original_idea.is_empty());
}

#[tokio::test]
async fn send_persists_before_and_after_the_exchange() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(RecordingStore {
        saved: Arc::clone(&saved),
        current: Mutex::new(None),
    });
    let mut conversation = Conversation::new(clarify_backend(), store);

    conversation.send("a doorbell for dogs").await;

    let lifecycles = saved.lock().expect("saved lifecycles");
    assert_eq!(
        *lifecycles,
        vec![Lifecycle::Idle, Lifecycle::AwaitingClarification]
    );
}
