/*!
SQLite-backed checkpointer.

One row per thread, replaced atomically on every save with a single
`INSERT ... ON CONFLICT DO UPDATE` statement - the per-key atomicity the
checkpoint contract requires. Serialization goes through the persistence
models (`runtimes::persistence`), keeping this module focused on database
I/O.

Schema (created idempotently on connect):

- `checkpoints.thread_id` ← `checkpoint.thread_id` (primary key)
- `checkpoints.step` ← `checkpoint.step`
- `checkpoints.state_json` ← serialized `PersistedState`
- `checkpoints.next_nodes_json` ← JSON array of encoded `NodeId`
- `checkpoints.updated_at` ← RFC3339 save time

Storage stays bounded at one row per thread; retention of finished threads
is an external policy.
*/

use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::runtimes::checkpointer::{Checkpoint, Checkpointer, CheckpointerError, Result};
use crate::runtimes::persistence::{PersistedCheckpoint, PersistedState};

/// Durable checkpoint store on a local SQLite database.
pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

impl SqliteCheckpointer {
    /// Connect to (or create) a SQLite database at `database_url`, e.g.
    /// `sqlite://greenroom.db`, and ensure the schema exists.
    #[must_use = "checkpointer must be used to persist state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Ensure the underlying file exists; SQLite won't create it through
        // a plain connect.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.trim();
            if !path.is_empty() && path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if !p.exists() {
                    let _ = std::fs::File::create_new(p);
                }
            }
        }

        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("connect error: {e}"),
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                step INTEGER NOT NULL,
                state_json TEXT NOT NULL,
                next_nodes_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("schema creation failed: {e}"),
        })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let state_json =
            serde_json::to_string(&persisted.state).map_err(|e| CheckpointerError::Serde {
                message: e.to_string(),
            })?;
        let next_nodes_json =
            serde_json::to_string(&persisted.next_nodes).map_err(|e| CheckpointerError::Serde {
                message: e.to_string(),
            })?;

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, step, state_json, next_nodes_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(thread_id) DO UPDATE SET
                step = excluded.step,
                state_json = excluded.state_json,
                next_nodes_json = excluded.next_nodes_json,
                updated_at = excluded.updated_at",
        )
        .bind(&persisted.thread_id)
        .bind(persisted.step as i64)
        .bind(&state_json)
        .bind(&next_nodes_json)
        .bind(&persisted.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("save failed: {e}"),
        })?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT step, state_json, next_nodes_json, updated_at
             FROM checkpoints WHERE thread_id = ?1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("load failed: {e}"),
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let step: i64 = row.try_get("step").map_err(backend)?;
        let state_json: String = row.try_get("state_json").map_err(backend)?;
        let next_nodes_json: String = row.try_get("next_nodes_json").map_err(backend)?;
        let updated_at: String = row.try_get("updated_at").map_err(backend)?;

        let state: PersistedState =
            serde_json::from_str(&state_json).map_err(|e| CheckpointerError::Serde {
                message: e.to_string(),
            })?;
        let next_nodes: Vec<String> =
            serde_json::from_str(&next_nodes_json).map_err(|e| CheckpointerError::Serde {
                message: e.to_string(),
            })?;

        let persisted = PersistedCheckpoint {
            thread_id: thread_id.to_string(),
            step: step as u64,
            state,
            next_nodes,
            updated_at,
        };
        Ok(Some(Checkpoint::from(persisted)))
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("list failed: {e}"),
            })?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("thread_id").map_err(backend))
            .collect()
    }
}

fn backend(e: sqlx::Error) -> CheckpointerError {
    CheckpointerError::Backend {
        message: e.to_string(),
    }
}
