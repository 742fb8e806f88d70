use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::models::{MessageRow, SessionRow};
use super::{ContextStore, DbPool};
use crate::models::chat::{Message, Session};
use crate::utils::error::RouterError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    topic TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions (id),
    seq INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    model TEXT,
    topic TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions (updated_at);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, seq);
"#;

/// SQLite-backed session store
pub struct SessionRepository {
    pub pool: DbPool,
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing
    pub async fn init_schema(&self) -> Result<(), RouterError> {
        sqlx::raw_sql(SCHEMA).execute(self.pool.get_pool()).await?;
        Ok(())
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, RouterError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, session_id, seq, role, content, created_at, model, topic
               FROM messages
               WHERE session_id = ?
               ORDER BY seq ASC"#,
        )
        .bind(session_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }
}

#[async_trait]
impl ContextStore for SessionRepository {
    async fn load(&self, id: &str) -> Result<Option<Session>, RouterError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"SELECT id, topic, metadata, created_at, updated_at
               FROM sessions
               WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages = self.load_messages(id).await?;
        debug!("Loaded session {} with {} messages", id, messages.len());

        row.into_session(messages).map(Some)
    }

    async fn save(&self, session: &Session) -> Result<(), RouterError> {
        let metadata = serde_json::to_string(&session.metadata)?;
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"INSERT INTO sessions (id, topic, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   topic = excluded.topic,
                   metadata = excluded.metadata,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&session.id)
        .bind(session.topic.map(|t| t.as_str()))
        .bind(&metadata)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await?;

        // Messages are immutable, so existing rows are left alone
        for (seq, message) in session.messages.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO messages (id, session_id, seq, role, content, created_at, model, topic)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (id) DO NOTHING"#,
            )
            .bind(&message.id)
            .bind(&session.id)
            .bind(seq as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.created_at)
            .bind(message.model.as_deref())
            .bind(message.topic.map(|t| t.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            "Saved session {} ({} messages)",
            session.id,
            session.messages.len()
        );
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RouterError> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Deleted session {} from store", id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>, RouterError> {
        let session_rows = sqlx::query_as::<_, SessionRow>(
            r#"SELECT id, topic, metadata, created_at, updated_at
               FROM sessions
               ORDER BY updated_at DESC"#,
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        let message_rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, session_id, seq, role, content, created_at, model, topic
               FROM messages
               ORDER BY session_id, seq ASC"#,
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        let mut grouped: HashMap<String, Vec<Message>> = HashMap::new();
        for row in message_rows {
            let session_id = row.session_id.clone();
            grouped
                .entry(session_id)
                .or_default()
                .push(Message::try_from(row)?);
        }

        let mut sessions = session_rows
            .into_iter()
            .map(|row| {
                let messages = grouped.remove(&row.id).unwrap_or_default();
                row.into_session(messages)
            })
            .collect::<Result<Vec<_>, _>>()?;

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}
