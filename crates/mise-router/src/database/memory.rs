use async_trait::async_trait;
use dashmap::DashMap;

use super::ContextStore;
use crate::models::chat::Session;
use crate::utils::error::RouterError;

/// Process-local store, for tests and throwaway runs
#[derive(Default)]
pub struct InMemoryContextStore {
    sessions: DashMap<String, Session>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, id: &str) -> Result<Option<Session>, RouterError> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn save(&self, session: &Session) -> Result<(), RouterError> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RouterError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>, RouterError> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}
