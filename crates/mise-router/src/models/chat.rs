use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type SessionId = String;

// ===== DOMAIN MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Coarse label used to pick a model and a system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Coding,
    Mlb,
    Cooking,
    Fitness,
    General,
    Complex,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Coding => "coding",
            Topic::Mlb => "mlb",
            Topic::Cooking => "cooking",
            Topic::Fitness => "fitness",
            Topic::General => "general",
            Topic::Complex => "complex",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coding" => Ok(Topic::Coding),
            "mlb" => Ok(Topic::Mlb),
            "cooking" => Ok(Topic::Cooking),
            "fitness" => Ok(Topic::Fitness),
            "general" => Ok(Topic::General),
            "complex" => Ok(Topic::Complex),
            other => Err(format!("unknown topic '{}'", other)),
        }
    }
}

/// One turn of a conversation. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

impl Message {
    pub fn user(content: impl Into<String>, topic: Topic, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            created_at,
            model: None,
            topic: Some(topic),
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        model: impl Into<String>,
        topic: Option<Topic>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            created_at,
            model: Some(model.into()),
            topic,
        }
    }
}

/// Persisted conversation with its ordered message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<Message>,
    pub topic: Option<Topic>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, topic: Option<Topic>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            topic,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Timestamp for the next appended message. Keeps `messages` strictly
    /// ordered even when the clock has not moved since the last append.
    pub fn next_message_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.messages.last() {
            Some(last) if now <= last.created_at => {
                last.created_at + chrono::Duration::microseconds(1)
            }
            _ => now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = message.created_at;
        self.messages.push(message);
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: SessionId,
    #[serde(default)]
    pub model: Option<String>,
    /// Only consulted by the WebSocket transport
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub topic: Option<String>,
}

// ===== RESPONSE EVENT MODELS =====

/// Result of a one-shot generation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub session_id: SessionId,
}

/// Event relayed to clients, identical for SSE and WebSocket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    Started {
        session_id: SessionId,
        model: String,
    },
    Chunk {
        chunk: String,
        model: String,
        done: bool,
    },
    Complete {
        session_id: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Error {
        error: String,
    },
}

impl ChatEvent {
    pub fn completed(session_id: impl Into<SessionId>) -> Self {
        ChatEvent::Complete {
            session_id: session_id.into(),
            response: None,
            model: None,
        }
    }

    pub fn error(error: impl fmt::Display) -> Self {
        ChatEvent::Error {
            error: error.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Complete { .. } | ChatEvent::Error { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Started { .. } => "started",
            ChatEvent::Chunk { .. } => "chunk",
            ChatEvent::Complete { .. } => "complete",
            ChatEvent::Error { .. } => "error",
        }
    }
}

impl From<ChatResponse> for ChatEvent {
    fn from(resp: ChatResponse) -> Self {
        ChatEvent::Complete {
            session_id: resp.session_id,
            response: Some(resp.response),
            model: Some(resp.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_wire_shape() {
        let started = serde_json::to_value(ChatEvent::Started {
            session_id: "s1".to_string(),
            model: "llama3.2:3b".to_string(),
        })
        .unwrap();
        assert_eq!(started["type"], "started");
        assert_eq!(started["sessionId"], "s1");

        let done = serde_json::to_value(ChatEvent::completed("s1")).unwrap();
        assert_eq!(done["type"], "complete");
        assert!(done.get("response").is_none());

        let once = serde_json::to_value(ChatEvent::from(ChatResponse {
            response: "hi".to_string(),
            model: "m".to_string(),
            session_id: "s1".to_string(),
        }))
        .unwrap();
        assert_eq!(once["response"], "hi");
        assert_eq!(once["model"], "m");
    }

    #[test]
    fn test_next_message_time_is_strict() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut session = Session::new("s1", None, now);
        session.push(Message::user("a", Topic::General, session.next_message_time(now)));
        let second = session.next_message_time(now);
        assert!(second > session.messages[0].created_at);
        assert_eq!(session.updated_at, now);
    }

    #[test]
    fn test_topic_parse() {
        assert_eq!("Coding".parse::<Topic>().unwrap(), Topic::Coding);
        assert!("astrology".parse::<Topic>().is_err());
    }

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"query":"hi"}"#).unwrap();
        assert_eq!(req.session_id, "");
        assert!(req.model.is_none());
        assert!(req.stream.is_none());
    }
}
