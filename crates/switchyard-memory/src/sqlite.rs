use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::CheckpointStore;
use switchyard_core::types::{ConversationState, SessionId};

/// Checkpoint store backed by SQLite. One row per session; the full state
/// is stored as JSON and overwritten on every save.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SwitchyardError::Database(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| SwitchyardError::Database(e.to_string()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| SwitchyardError::Database(e.to_string()))?;

        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| SwitchyardError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                 session_id TEXT PRIMARY KEY,
                 state_json TEXT NOT NULL,
                 turn INTEGER NOT NULL DEFAULT 0,
                 updated_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_checkpoints_updated
                 ON checkpoints(updated_at DESC);",
        )
        .map_err(|e| SwitchyardError::Database(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SwitchyardError::Checkpoint(e.to_string()))
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<ConversationState>> {
        Box::pin(async move {
            let json: Option<String> = {
                let conn = self.lock()?;
                conn.query_row(
                    "SELECT state_json FROM checkpoints WHERE session_id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| SwitchyardError::Checkpoint(format!("Failed to load checkpoint: {}", e)))?
            };

            match json {
                Some(json) => serde_json::from_str(&json).map_err(|e| {
                    SwitchyardError::Checkpoint(format!(
                        "Corrupt checkpoint for session {}: {}",
                        session_id, e
                    ))
                }),
                None => {
                    debug!(session_id = %session_id, "No checkpoint, starting fresh state");
                    Ok(ConversationState::new(session_id.clone()))
                }
            }
        })
    }

    fn save<'a>(&'a self, state: &'a ConversationState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let json = serde_json::to_string(state).map_err(|e| {
                SwitchyardError::Checkpoint(format!("Failed to serialize state: {}", e))
            })?;
            let updated_at = state.updated_at().unwrap_or_else(Utc::now).to_rfc3339();

            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO checkpoints (session_id, state_json, turn, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     turn = excluded.turn,
                     updated_at = excluded.updated_at",
                params![
                    state.session_id().as_str(),
                    json,
                    state.turn() as i64,
                    updated_at
                ],
            )
            .map_err(|e| SwitchyardError::Checkpoint(format!("Failed to save checkpoint: {}", e)))?;

            debug!(
                session_id = %state.session_id(),
                messages = state.len(),
                "Checkpoint saved"
            );
            Ok(())
        })
    }

    fn delete<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let deleted = conn
                .execute(
                    "DELETE FROM checkpoints WHERE session_id = ?1",
                    params![session_id.as_str()],
                )
                .map_err(|e| SwitchyardError::Checkpoint(e.to_string()))?;
            Ok(deleted > 0)
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<SessionId>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare("SELECT session_id FROM checkpoints ORDER BY updated_at DESC")
                .map_err(|e| SwitchyardError::Database(e.to_string()))?;

            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0).map(SessionId))
                .map_err(|e| SwitchyardError::Database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SwitchyardError::Database(e.to_string()))?;

            Ok(ids)
        })
    }
}
