use crate::migrations::run_migrations;
use crate::state::{StateScope, StateStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task;

/// SQLite-backed conversation state, one row per `(conversation, scope)`.
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&conn)?;
        tracing::info!(path, "opened conversation state store");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of conversations that currently hold any state.
    pub async fn conversation_count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT conversation_key) FROM conversation_state",
                [],
                |row| row.get(0),
            )?;
            Ok::<usize, anyhow::Error>(count as usize)
        })
        .await?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, conversation: &str, scope: StateScope) -> Result<Option<Value>> {
        let db = Arc::clone(&self.db);
        let conversation = conversation.to_owned();
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let raw: Option<String> = conn
                .query_row(
                    r#"
                    SELECT value FROM conversation_state
                    WHERE conversation_key = ?1 AND scope = ?2
                    LIMIT 1
                    "#,
                    params![conversation, scope.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(raw) => Ok::<Option<Value>, anyhow::Error>(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    async fn set(&self, conversation: &str, scope: StateScope, value: Value) -> Result<()> {
        let db = Arc::clone(&self.db);
        let conversation = conversation.to_owned();
        task::spawn_blocking(move || {
            let raw = serde_json::to_string(&value)?;
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            conn.execute(
                r#"
                INSERT INTO conversation_state (conversation_key, scope, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(conversation_key, scope) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![conversation, scope.as_str(), raw, Utc::now().to_rfc3339()],
            )?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    async fn delete(&self, conversation: &str, scope: StateScope) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let conversation = conversation.to_owned();
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow!("failed to lock sqlite connection: {e}"))?;
            let deleted = conn.execute(
                "DELETE FROM conversation_state WHERE conversation_key = ?1 AND scope = ?2",
                params![conversation, scope.as_str()],
            )?;
            Ok::<bool, anyhow::Error>(deleted > 0)
        })
        .await?
    }

    async fn clear_conversation(&self, conversation: &str) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let conversation = conversation.to_owned();
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow!("failed to lock sqlite connection: {e}"))?;
            let deleted = conn.execute(
                "DELETE FROM conversation_state WHERE conversation_key = ?1",
                params![conversation],
            )?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await?
    }
}
