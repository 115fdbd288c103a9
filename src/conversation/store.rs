//! Best-effort snapshot persistence.
//!
//! One named record in a small SQLite database. The store is fire-and-forget
//! from the conversation's point of view: every failure is logged and
//! swallowed, an absent or unreadable record reads as "no prior session",
//! and nothing here ever becomes a user-facing error.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::state::PersistedSnapshot;

/// Upper bound on a serialized snapshot (256 KiB). Larger ones are skipped.
pub const MAX_SNAPSHOT_BYTES: usize = 262_144;

/// Name of the single record a conversation occupies.
const RECORD_NAME: &str = "conversation";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    name TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable home for the conversation snapshot.
///
/// All three operations are infallible on purpose: implementations contain
/// their own errors, logging at most a warning.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the stored snapshot, if a usable one exists.
    async fn load(&self) -> Option<PersistedSnapshot>;

    /// Write the snapshot, replacing any previous one.
    async fn save(&self, snapshot: &PersistedSnapshot);

    /// Delete the stored snapshot.
    async fn clear(&self);
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// Snapshot store backed by a SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the snapshot database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot
    /// be applied. Callers are expected to fall back to [`NullStore`] rather
    /// than abort.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create snapshot db directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open snapshot db at {}", path.display()))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to apply snapshot schema")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load(&self) -> Option<PersistedSnapshot> {
        let row: Option<(String,)> =
            match sqlx::query_as("SELECT payload FROM snapshots WHERE name = ?1")
                .bind(RECORD_NAME)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "failed to read snapshot, starting fresh");
                    return None;
                }
            };

        let (payload,) = row?;
        match serde_json::from_str(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "stored snapshot is unreadable, starting fresh");
                None
            }
        }
    }

    async fn save(&self, snapshot: &PersistedSnapshot) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize snapshot, skipping save");
                return;
            }
        };
        if payload.len() > MAX_SNAPSHOT_BYTES {
            warn!(
                bytes = payload.len(),
                limit = MAX_SNAPSHOT_BYTES,
                "snapshot too large, skipping save"
            );
            return;
        }

        let result = sqlx::query(
            "INSERT INTO snapshots (name, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                payload = ?2,
                updated_at = ?3",
        )
        .bind(RECORD_NAME)
        .bind(&payload)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => debug!(bytes = payload.len(), "snapshot saved"),
            Err(e) => warn!(error = %e, "failed to save snapshot"),
        }
    }

    async fn clear(&self) {
        if let Err(e) = sqlx::query("DELETE FROM snapshots WHERE name = ?1")
            .bind(RECORD_NAME)
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "failed to clear snapshot");
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory and null stores
// ---------------------------------------------------------------------------

/// Snapshot store living entirely in memory. Used by tests and for runs
/// where no durable path is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<PersistedSnapshot>>,
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Option<PersistedSnapshot> {
        self.inner.lock().ok().and_then(|guard| guard.clone())
    }

    async fn save(&self, snapshot: &PersistedSnapshot) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(snapshot.clone());
        }
    }

    async fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}

/// Store that remembers nothing. The fallback when the SQLite store cannot
/// open; the conversation works, it just will not survive a restart.
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl SnapshotStore for NullStore {
    async fn load(&self) -> Option<PersistedSnapshot> {
        None
    }

    async fn save(&self, _snapshot: &PersistedSnapshot) {}

    async fn clear(&self) {}
}
