use chrono::{DateTime, Utc};

use crate::models::chat::Session;

/// In-memory view of a session owned by the session cache
#[derive(Debug, Clone)]
pub struct CachedSession {
    pub session: Session,

    /// Last time a request path touched this session (for eviction)
    pub last_accessed: DateTime<Utc>,

    /// Memory has diverged from the durable store
    pub dirty: bool,

    /// Bumped on every mutation; a flush only clears `dirty` if unchanged
    pub(crate) version: u64,

    /// Set by delete so late writers and in-flight flushes can back off
    pub(crate) deleted: bool,
}

impl CachedSession {
    /// Entry for a session that matches the durable store
    pub fn clean(session: Session, now: DateTime<Utc>) -> Self {
        Self {
            session,
            last_accessed: now,
            dirty: false,
            version: 0,
            deleted: false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.version += 1;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, expiry: chrono::Duration) -> bool {
        now - self.last_accessed > expiry
    }
}
