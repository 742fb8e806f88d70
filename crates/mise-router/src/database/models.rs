use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::models::chat::{Message, Role, Session, Topic};
use crate::utils::error::RouterError;

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub topic: Option<String>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub seq: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub model: Option<String>,
    pub topic: Option<String>,
}

fn parse_topic(raw: Option<String>, owner: &str) -> Result<Option<Topic>, RouterError> {
    raw.map(|t| {
        t.parse::<Topic>()
            .map_err(|e| RouterError::Persistence(format!("{} has {}", owner, e)))
    })
    .transpose()
}

impl TryFrom<MessageRow> for Message {
    type Error = RouterError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let owner = format!("message {}", row.id);
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| RouterError::Persistence(format!("{} has {}", owner, e)))?;
        let topic = parse_topic(row.topic, &owner)?;

        Ok(Message {
            id: row.id,
            role,
            content: row.content,
            created_at: row.created_at,
            model: row.model,
            topic,
        })
    }
}

impl SessionRow {
    pub fn into_session(self, messages: Vec<Message>) -> Result<Session, RouterError> {
        let owner = format!("session {}", self.id);
        let topic = parse_topic(self.topic, &owner)?;

        let metadata: BTreeMap<String, serde_json::Value> = if self.metadata.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.metadata).map_err(|e| {
                RouterError::Persistence(format!("{} has malformed metadata: {}", owner, e))
            })?
        };

        Ok(Session {
            id: self.id,
            messages,
            topic,
            metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
