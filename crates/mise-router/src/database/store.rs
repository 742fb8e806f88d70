use async_trait::async_trait;

use crate::models::chat::Session;
use crate::utils::error::RouterError;

/// Durable key-value storage of whole session records.
///
/// Implementations treat each call as atomic per record; concurrent writes
/// to the same id are serialized by the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Session>, RouterError>;

    /// Full overwrite of the session row, merge of its messages
    async fn save(&self, session: &Session) -> Result<(), RouterError>;

    async fn delete(&self, id: &str) -> Result<(), RouterError>;

    /// All sessions, most recently updated first
    async fn list(&self) -> Result<Vec<Session>, RouterError>;
}
