use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::session::ChatSession;

/// Shared handle to a live session. Holding the lock is what serializes turns:
/// a second submission for the same session waits until the first returns.
pub type SessionHandle = Arc<Mutex<ChatSession>>;

/// Trait for creating, looking up and ending chat sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self) -> SessionHandle;
    /// Looking a session up counts as activity.
    async fn get(&self, id: &str) -> Option<SessionHandle>;
    /// Returns `false` when no session had that id.
    async fn delete(&self, id: &str) -> bool;
    /// End every session with no activity for longer than `ttl`. Sessions with a
    /// turn in flight are kept. Returns how many were removed.
    async fn evict_idle(&self, ttl: Duration) -> usize;
}

struct StoredSession {
    handle: SessionHandle,
    last_active: Instant,
}

/// In-memory implementation of SessionStore; sessions die with the process.
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> SessionHandle {
        let session = ChatSession::new();
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(
            id.clone(),
            StoredSession {
                handle: handle.clone(),
                last_active: Instant::now(),
            },
        );
        info!("Session {} started", id);
        handle
    }

    async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get_mut(id).map(|mut entry| {
            entry.last_active = Instant::now();
            entry.handle.clone()
        })
    }

    async fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!("Session {} ended", id);
        }
        removed
    }

    async fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, stored| {
            let idle = stored.last_active.elapsed() > ttl;
            let busy = stored.handle.try_lock().is_err();
            if idle && !busy {
                info!("Session {} expired after {:?} idle", id, ttl);
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.sessions.len())
    }
}

/// Periodically end sessions idle for longer than `ttl`.
pub fn spawn_session_sweeper(store: Arc<dyn SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = ttl.min(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(ttl).await;
            if evicted > 0 {
                debug!("Evicted {} idle sessions", evicted);
            }
        }
    })
}
