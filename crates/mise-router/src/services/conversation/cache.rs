use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::types::CachedSession;
use crate::config::CacheConfig;
use crate::database::ContextStore;
use crate::models::chat::{Message, Session, SessionId, Topic};
use crate::utils::clock::Clock;
use crate::utils::error::RouterError;

type Entry = Arc<Mutex<CachedSession>>;

struct Maintenance {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Write-back cache of conversation state in front of a [`ContextStore`].
///
/// Each session sits behind its own mutex so unrelated sessions never
/// contend. Locks are only held for in-memory work, never across an await.
///
/// Ids with a store delete in flight are tombstoned in `deleting` and are
/// never reloaded from the store until that delete has returned.
pub struct SessionCache {
    entries: DashMap<SessionId, Entry>,
    deleting: DashMap<SessionId, usize>,
    /// Bumped whenever a delete starts; loads that straddle one are retried
    deletions: AtomicU64,
    store: Arc<dyn ContextStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    maintenance: Mutex<Option<Maintenance>>,
}

impl SessionCache {
    pub fn new(store: Arc<dyn ContextStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        info!(
            "Initializing session cache (flush every {}s, expiry {}s)",
            config.flush_interval_seconds, config.expiry_seconds
        );
        Self {
            entries: DashMap::new(),
            deleting: DashMap::new(),
            deletions: AtomicU64::new(0),
            store,
            clock,
            config,
            maintenance: Mutex::new(None),
        }
    }

    /// Number of sessions resident in memory
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resident(&self, id: &str) -> Option<Entry> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    fn is_deleting(&self, id: &str) -> bool {
        self.deleting.contains_key(id)
    }

    /// Insert a session that matches the store. If another task got there
    /// first, its entry wins. Returns `None` if the id is tombstoned or any
    /// delete started after `epoch` was read; the caller must look again.
    /// Checked under the map's shard lock, so a concurrent delete either
    /// removes this entry or is seen here.
    fn admit(&self, session: Session, epoch: u64) -> Option<Entry> {
        let now = self.clock.now();
        match self.entries.entry(session.id.clone()) {
            MapEntry::Occupied(existing) => Some(Arc::clone(existing.get())),
            MapEntry::Vacant(slot) => {
                if self.is_deleting(&session.id) || self.deletions.load(Ordering::SeqCst) != epoch {
                    return None;
                }
                let entry = Arc::new(Mutex::new(CachedSession::clean(session, now)));
                slot.insert(Arc::clone(&entry));
                Some(entry)
            }
        }
    }

    /// Resident entry, or the stored session loaded into memory
    async fn load_entry(&self, id: &str) -> Result<Option<Entry>, RouterError> {
        loop {
            if let Some(entry) = self.resident(id) {
                return Ok(Some(entry));
            }

            let epoch = self.deletions.load(Ordering::SeqCst);
            if self.is_deleting(id) {
                return Ok(None);
            }

            let Some(session) = self.store.load(id).await? else {
                return Ok(None);
            };
            if let Some(entry) = self.admit(session, epoch) {
                debug!("Loaded session {} from store", id);
                return Ok(Some(entry));
            }
            debug!("Delete of {} raced the load, looking again", id);
        }
    }

    pub async fn get_or_create(&self, id: &str) -> Result<CachedSession, RouterError> {
        let entry = loop {
            if let Some(entry) = self.load_entry(id).await? {
                break entry;
            }
            if self.is_deleting(id) {
                return Err(RouterError::NotFound(format!("Session {} is being deleted", id)));
            }

            let epoch = self.deletions.load(Ordering::SeqCst);
            let session = Session::new(id, None, self.clock.now());
            self.store.save(&session).await?;
            if let Some(entry) = self.admit(session, epoch) {
                info!("Created session {}", id);
                break entry;
            }
        };

        let mut guard = entry.lock();
        guard.touch(self.clock.now());
        Ok(guard.clone())
    }

    /// Read-only lookup; never creates and does not count as activity
    pub async fn get(&self, id: &str) -> Result<Option<Session>, RouterError> {
        loop {
            if let Some(entry) = self.resident(id) {
                let guard = entry.lock();
                if !guard.deleted {
                    return Ok(Some(guard.session.clone()));
                }
            }

            let epoch = self.deletions.load(Ordering::SeqCst);
            if self.is_deleting(id) {
                return Ok(None);
            }
            let stored = self.store.load(id).await?;
            if stored.is_none() || self.deletions.load(Ordering::SeqCst) == epoch {
                return Ok(stored);
            }
        }
    }

    /// New session under a fresh id, persisted before it is returned
    pub async fn create(&self, topic: Option<Topic>) -> Result<Session, RouterError> {
        let session = Session::new(uuid::Uuid::new_v4().to_string(), topic, self.clock.now());
        self.store.save(&session).await?;
        info!("Created session {} (topic: {:?})", session.id, topic);

        let entry = CachedSession::clean(session.clone(), self.clock.now());
        self.entries
            .insert(session.id.clone(), Arc::new(Mutex::new(entry)));
        Ok(session)
    }

    /// Stored sessions with resident copies taking precedence, newest first
    pub async fn list(&self) -> Result<Vec<Session>, RouterError> {
        let mut merged: HashMap<SessionId, Session> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let resident: Vec<Entry> = self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        for entry in resident {
            let guard = entry.lock();
            if !guard.deleted {
                merged.insert(guard.session.id.clone(), guard.session.clone());
            }
        }

        let mut sessions: Vec<Session> = merged.into_values().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    pub async fn append_user_turn(
        &self,
        id: &str,
        content: &str,
        topic: Topic,
    ) -> Result<CachedSession, RouterError> {
        let entry = self
            .load_entry(id)
            .await?
            .ok_or_else(|| RouterError::NotFound(format!("Session {} not found", id)))?;

        let now = self.clock.now();
        let mut guard = entry.lock();
        if guard.deleted {
            return Err(RouterError::NotFound(format!("Session {} not found", id)));
        }

        let created_at = guard.session.next_message_time(now);
        guard.session.push(Message::user(content, topic, created_at));
        guard.session.topic = Some(topic);
        guard.touch(now);
        guard.mark_dirty();

        debug!(
            "Appended user turn to {} ({} messages)",
            id,
            guard.session.messages.len()
        );
        Ok(guard.clone())
    }

    /// Record the model's answer. A session deleted in the meantime is left
    /// alone and the answer is dropped.
    pub async fn append_assistant_turn(
        &self,
        id: &str,
        content: &str,
        model: &str,
    ) -> Result<(), RouterError> {
        let Some(entry) = self.load_entry(id).await? else {
            debug!("Session {} is gone, discarding assistant turn", id);
            return Ok(());
        };

        let now = self.clock.now();
        let mut guard = entry.lock();
        if guard.deleted {
            debug!("Session {} was deleted, discarding assistant turn", id);
            return Ok(());
        }

        let created_at = guard.session.next_message_time(now);
        let topic = guard.session.topic;
        guard
            .session
            .push(Message::assistant(content, model, topic, created_at));
        guard.touch(now);
        guard.mark_dirty();

        debug!("Appended assistant turn to {} from {}", id, model);
        Ok(())
    }

    /// Remove from memory and from the store. Idempotent.
    pub async fn delete(&self, id: &str) -> Result<(), RouterError> {
        *self.deleting.entry(id.to_string()).or_insert(0) += 1;
        self.deletions.fetch_add(1, Ordering::SeqCst);

        if let Some((_, entry)) = self.entries.remove(id) {
            entry.lock().deleted = true;
        }
        let result = self.store.delete(id).await;

        if let Some(mut pending) = self.deleting.get_mut(id) {
            *pending -= 1;
        }
        self.deleting.remove_if(id, |_, pending| *pending == 0);

        result?;
        info!("Deleted session {}", id);
        Ok(())
    }

    /// Write every dirty session to the store. Returns how many were written.
    pub async fn flush_dirty(&self) -> usize {
        let resident: Vec<Entry> = self.entries.iter().map(|e| Arc::clone(e.value())).collect();

        let snapshots: Vec<(Entry, Session, u64)> = resident
            .into_iter()
            .filter_map(|entry| {
                let snapshot = {
                    let guard = entry.lock();
                    let live = !guard.deleted && !self.is_deleting(&guard.session.id);
                    (guard.dirty && live).then(|| (guard.session.clone(), guard.version))
                };
                snapshot.map(|(session, version)| (entry, session, version))
            })
            .collect();

        let mut written = 0;
        for (entry, session, version) in snapshots {
            if let Err(e) = self.store.save(&session).await {
                warn!("Failed to flush session {}, will retry: {}", session.id, e);
                continue;
            }
            written += 1;

            let deleted = {
                let mut guard = entry.lock();
                if !guard.deleted && guard.version == version {
                    guard.dirty = false;
                }
                guard.deleted
            };

            // Deleted while the save was in flight
            if deleted {
                if let Err(e) = self.store.delete(&session.id).await {
                    warn!("Failed to re-delete session {}: {}", session.id, e);
                }
            }
        }

        if written > 0 {
            debug!("Flushed {} dirty sessions", written);
        }
        written
    }

    /// Drop clean sessions idle past the expiry window. Memory only.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let expiry = self.config.expiry();
        let mut evicted = 0;

        self.entries.retain(|_, entry| {
            let guard = entry.lock();
            let keep = guard.dirty || !guard.is_expired(now, expiry);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    pub async fn run_maintenance(&self) {
        let flushed = self.flush_dirty().await;
        let evicted = self.evict_expired();
        if flushed > 0 || evicted > 0 {
            info!(
                "Cache maintenance: flushed={}, evicted={}, resident={}",
                flushed,
                evicted,
                self.len()
            );
        }
    }

    /// Spawn the periodic flush + eviction task
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.maintenance.lock();
        if slot.is_some() {
            warn!("Cache maintenance already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let cache = Arc::clone(self);
        let period = self.config.flush_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.run_maintenance().await,
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("Cache maintenance task exiting");
        });

        *slot = Some(Maintenance { shutdown, task });
        info!("Cache maintenance started (every {:?})", period);
    }

    /// Stop the maintenance task and write out anything still dirty
    pub async fn stop(&self) {
        let maintenance = self.maintenance.lock().take();
        if let Some(Maintenance { shutdown, task }) = maintenance {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!("Cache maintenance task ended abnormally: {}", e);
            }
        }

        let flushed = self.flush_dirty().await;
        info!("Session cache stopped, final flush wrote {} sessions", flushed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{InMemoryContextStore, MockContextStore};
    use crate::models::chat::Role;
    use crate::utils::clock::ManualClock;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    /// In-memory store whose saves and deletes can be held open
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryContextStore,
        hold_saves: AtomicBool,
        hold_deletes: AtomicBool,
        save_entered: Notify,
        save_released: Notify,
        delete_entered: Notify,
        delete_released: Notify,
    }

    #[async_trait::async_trait]
    impl ContextStore for GatedStore {
        async fn load(&self, id: &str) -> Result<Option<Session>, RouterError> {
            self.inner.load(id).await
        }

        async fn save(&self, session: &Session) -> Result<(), RouterError> {
            if self.hold_saves.load(Ordering::SeqCst) {
                self.save_entered.notify_one();
                self.save_released.notified().await;
            }
            self.inner.save(session).await
        }

        async fn delete(&self, id: &str) -> Result<(), RouterError> {
            if self.hold_deletes.load(Ordering::SeqCst) {
                self.delete_entered.notify_one();
                self.delete_released.notified().await;
            }
            self.inner.delete(id).await
        }

        async fn list(&self) -> Result<Vec<Session>, RouterError> {
            self.inner.list().await
        }
    }

    fn cache_with(store: Arc<dyn ContextStore>) -> (SessionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SessionCache::new(store, clock.clone(), CacheConfig::default());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_get_or_create_persists_new_session() {
        let store = Arc::new(InMemoryContextStore::new());
        let (cache, _) = cache_with(store.clone());

        let entry = cache.get_or_create("s1").await.unwrap();
        assert_eq!(entry.session.id, "s1");
        assert!(entry.session.messages.is_empty());
        assert!(!entry.dirty);

        let durable = store.load("s1").await.unwrap().unwrap();
        assert_eq!(durable.id, "s1");
        assert!(durable.messages.is_empty());
    }

    #[tokio::test]
    async fn test_creation_failure_surfaces() {
        let mut store = MockContextStore::new();
        store.expect_load().returning(|_| Ok(None));
        store
            .expect_save()
            .returning(|_| Err(RouterError::Persistence("disk full".into())));
        let (cache, _) = cache_with(Arc::new(store));

        let err = cache.get_or_create("s1").await.unwrap_err();
        assert!(matches!(err, RouterError::Persistence(_)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_order() {
        let store = Arc::new(InMemoryContextStore::new());
        let (cache, _) = cache_with(store);
        cache.get_or_create("s1").await.unwrap();

        // clock never moves, timestamps must still be strictly increasing
        for i in 0..5 {
            cache
                .append_user_turn("s1", &format!("q{}", i), Topic::General)
                .await
                .unwrap();
            cache
                .append_assistant_turn("s1", &format!("a{}", i), "m")
                .await
                .unwrap();
        }

        let session = cache.get("s1").await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 10);
        for pair in session.messages.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
        assert_eq!(session.messages[0].content, "q0");
        assert_eq!(session.messages[9].role, Role::Assistant);
        assert_eq!(session.messages[9].content, "a4");
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_not_found() {
        let (cache, _) = cache_with(Arc::new(InMemoryContextStore::new()));
        let err = cache
            .append_user_turn("missing", "hi", Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_assistant_turn_carries_session_topic() {
        let (cache, _) = cache_with(Arc::new(InMemoryContextStore::new()));
        cache.get_or_create("s1").await.unwrap();
        cache
            .append_user_turn("s1", "a recipe", Topic::Cooking)
            .await
            .unwrap();
        cache.append_assistant_turn("s1", "pancakes", "m").await.unwrap();

        let session = cache.get("s1").await.unwrap().unwrap();
        assert_eq!(session.topic, Some(Topic::Cooking));
        assert_eq!(session.messages[1].topic, Some(Topic::Cooking));
        assert_eq!(session.messages[1].model.as_deref(), Some("m"));
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let mut store = MockContextStore::new();
        store.expect_load().returning(|_| Ok(None));
        // one write on creation, one on the first flush
        store.expect_save().times(2).returning(|_| Ok(()));
        let (cache, _) = cache_with(Arc::new(store));

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();

        assert_eq!(cache.flush_dirty().await, 1);
        assert_eq!(cache.flush_dirty().await, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut store = MockContextStore::new();
        store.expect_load().returning(|_| Ok(None));
        store.expect_save().times(3).returning(move |_| {
            // creation succeeds, first flush fails, retry succeeds
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(RouterError::Persistence("locked".into()))
            } else {
                Ok(())
            }
        });
        let (cache, _) = cache_with(Arc::new(store));

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();

        assert_eq!(cache.flush_dirty().await, 0);
        assert!(cache.get_or_create("s1").await.unwrap().dirty);
        assert_eq!(cache.flush_dirty().await, 1);
        assert_eq!(cache.flush_dirty().await, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_eviction_respects_ttl_and_reload_matches() {
        let store = Arc::new(InMemoryContextStore::new());
        let (cache, clock) = cache_with(store);

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hello", Topic::General).await.unwrap();
        cache.append_assistant_turn("s1", "hi there", "m").await.unwrap();

        clock.advance(Duration::minutes(31));
        // dirty sessions stay resident
        assert_eq!(cache.evict_expired(), 0);

        cache.flush_dirty().await;
        let before = cache.get_or_create("s1").await.unwrap().session;

        clock.advance(Duration::minutes(29));
        assert_eq!(cache.evict_expired(), 0);
        clock.advance(Duration::minutes(2));
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());

        let reloaded = cache.get_or_create("s1").await.unwrap();
        assert_eq!(reloaded.session, before);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_access_prevents_eviction() {
        let (cache, clock) = cache_with(Arc::new(InMemoryContextStore::new()));
        cache.get_or_create("s1").await.unwrap();

        clock.advance(Duration::minutes(20));
        cache.get_or_create("s1").await.unwrap();
        clock.advance(Duration::minutes(20));

        assert_eq!(cache.evict_expired(), 0);
    }

    #[tokio::test]
    async fn test_delete_during_generation_discards_answer() {
        let store = Arc::new(InMemoryContextStore::new());
        let (cache, _) = cache_with(store.clone());

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();

        cache.delete("s1").await.unwrap();
        cache.append_assistant_turn("s1", "late answer", "m").await.unwrap();

        assert!(cache.get("s1").await.unwrap().is_none());
        assert!(store.is_empty());
        assert_eq!(cache.flush_dirty().await, 0);
    }

    #[tokio::test]
    async fn test_list_overlays_resident_sessions() {
        let store = Arc::new(InMemoryContextStore::new());
        let (cache, clock) = cache_with(store);

        let first = cache.create(Some(Topic::Coding)).await.unwrap();
        clock.advance(Duration::seconds(1));
        let second = cache.create(None).await.unwrap();
        clock.advance(Duration::seconds(1));

        // unflushed append makes the first session the freshest
        cache
            .append_user_turn(&first.id, "debug this", Topic::Coding)
            .await
            .unwrap();

        let sessions = cache.list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first.id);
        assert_eq!(sessions[0].messages.len(), 1);
        assert_eq!(sessions[1].id, second.id);
    }

    #[tokio::test]
    async fn test_stop_flushes_dirty_sessions() {
        let store = Arc::new(InMemoryContextStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(SessionCache::new(
            store.clone(),
            clock,
            CacheConfig::default(),
        ));
        cache.start();

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();

        cache.stop().await;

        let durable = store.load("s1").await.unwrap().unwrap();
        assert_eq!(durable.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_late_writes_during_delete_do_not_resurrect() {
        let store = Arc::new(GatedStore::default());
        let (cache, _) = cache_with(store.clone());
        let cache = Arc::new(cache);

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();
        assert_eq!(cache.flush_dirty().await, 1);

        store.hold_deletes.store(true, Ordering::SeqCst);
        let deleting = tokio::spawn({
            let cache = cache.clone();
            async move { cache.delete("s1").await }
        });
        store.delete_entered.notified().await;

        // durable row still present while the delete is parked
        assert!(store.inner.load("s1").await.unwrap().is_some());
        cache.append_assistant_turn("s1", "late answer", "m").await.unwrap();
        assert!(cache.get("s1").await.unwrap().is_none());
        let err = cache
            .append_user_turn("s1", "again", Topic::General)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
        assert!(matches!(
            cache.get_or_create("s1").await.unwrap_err(),
            RouterError::NotFound(_)
        ));
        assert!(cache.is_empty());
        assert_eq!(cache.flush_dirty().await, 0);

        store.delete_released.notify_one();
        deleting.await.unwrap().unwrap();

        assert_eq!(cache.flush_dirty().await, 0);
        assert!(cache.get("s1").await.unwrap().is_none());
        assert!(store.inner.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_append_during_flush_stays_dirty() {
        let store = Arc::new(GatedStore::default());
        let (cache, _) = cache_with(store.clone());
        let cache = Arc::new(cache);

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "first", Topic::General).await.unwrap();

        store.hold_saves.store(true, Ordering::SeqCst);
        let flushing = tokio::spawn({
            let cache = cache.clone();
            async move { cache.flush_dirty().await }
        });
        store.save_entered.notified().await;

        cache.append_assistant_turn("s1", "second", "m").await.unwrap();
        store.save_released.notify_one();
        assert_eq!(flushing.await.unwrap(), 1);

        // the in-flight snapshot predates the assistant turn
        let durable = store.inner.load("s1").await.unwrap().unwrap();
        assert_eq!(durable.messages.len(), 1);
        assert!(cache.get_or_create("s1").await.unwrap().dirty);

        store.hold_saves.store(false, Ordering::SeqCst);
        assert_eq!(cache.flush_dirty().await, 1);
        let durable = store.inner.load("s1").await.unwrap().unwrap();
        assert_eq!(durable.messages.len(), 2);
        assert_eq!(durable.messages[1].content, "second");
        assert!(!cache.get_or_create("s1").await.unwrap().dirty);
        assert_eq!(cache.flush_dirty().await, 0);
    }

    #[tokio::test]
    async fn test_delete_during_flush_removes_durable_copy() {
        let store = Arc::new(GatedStore::default());
        let (cache, _) = cache_with(store.clone());
        let cache = Arc::new(cache);

        cache.get_or_create("s1").await.unwrap();
        cache.append_user_turn("s1", "hi", Topic::General).await.unwrap();

        store.hold_saves.store(true, Ordering::SeqCst);
        let flushing = tokio::spawn({
            let cache = cache.clone();
            async move { cache.flush_dirty().await }
        });
        store.save_entered.notified().await;

        cache.delete("s1").await.unwrap();
        assert!(store.inner.is_empty());

        // the parked save lands after the delete and must be undone
        store.save_released.notify_one();
        assert_eq!(flushing.await.unwrap(), 1);

        assert!(store.inner.is_empty());
        assert!(cache.get("s1").await.unwrap().is_none());
        assert_eq!(cache.flush_dirty().await, 0);
    }
}
