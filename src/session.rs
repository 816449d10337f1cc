//! In-memory conversation sessions
//!
//! Sessions are created lazily on first reference and live for the process
//! lifetime unless a [`RetentionPolicy`] bounds them. Each session sits
//! behind its own mutex so turns against one session never interleave
//! while different sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when rendering a transcript into a prompt
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A conversation and its ordered transcript
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    pub id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationSession {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Append a message and mark the session active
    pub fn push(&mut self, message: ConversationMessage) {
        self.last_activity_at = Utc::now();
        self.messages.push(message);
    }

    /// The most recent `n` messages in chronological order
    #[must_use]
    pub fn recent(&self, n: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Shared, individually locked session
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Bounds on how many sessions are kept and for how long
///
/// Both bounds are off by default, so sessions accumulate for the
/// process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of sessions; the least recently active is evicted
    pub max_sessions: Option<usize>,
    /// Sessions idle for longer than this are dropped by the sweeper
    pub idle_ttl: Option<Duration>,
}

/// Session store keyed by client-supplied session id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    retention: RetentionPolicy,
}

impl SessionStore {
    #[must_use]
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retention,
        }
    }

    #[must_use]
    pub const fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Get the lock handle for a session, creating the session if absent
    pub async fn handle(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(id) {
            return Arc::clone(handle);
        }

        if let Some(max) = self.retention.max_sessions {
            while sessions.len() >= max.max(1) {
                if !evict_least_recent(&mut sessions) {
                    break;
                }
            }
        }

        tracing::debug!(session_id = id, "creating session");
        let handle = Arc::new(Mutex::new(ConversationSession::new(id)));
        sessions.insert(id.to_string(), Arc::clone(&handle));
        handle
    }

    /// Snapshot of a session, creating it if absent
    pub async fn get_or_create(&self, id: &str) -> ConversationSession {
        let handle = self.handle(id).await;
        let session = handle.lock().await;
        session.clone()
    }

    /// Append a message to a session, creating it if absent
    pub async fn append(&self, id: &str, message: ConversationMessage) {
        let handle = self.handle(id).await;
        handle.lock().await.push(message);
    }

    /// Ordered transcript of a session; empty for unknown ids
    pub async fn history(&self, id: &str) -> Vec<ConversationMessage> {
        let Some(handle) = self.sessions.read().await.get(id).cloned() else {
            return Vec::new();
        };
        let session = handle.lock().await;
        session.messages.clone()
    }

    /// The most recent `n` messages of a session in chronological order
    pub async fn context_window(&self, id: &str, n: usize) -> Vec<ConversationMessage> {
        let Some(handle) = self.sessions.read().await.get(id).cloned() else {
            return Vec::new();
        };
        let session = handle.lock().await;
        session.recent(n).to_vec()
    }

    /// Number of sessions currently held
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are held
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for longer than the retention TTL
    ///
    /// Sessions with an outstanding handle are in use and are kept.
    /// Returns the number of evicted sessions.
    pub async fn evict_expired(&self) -> usize {
        let Some(ttl) = self.retention.idle_ttl else {
            return 0;
        };
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            idle_activity(handle).is_none_or(|last_activity| now - last_activity <= ttl)
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Spawn a task that periodically evicts idle sessions
    ///
    /// Returns `None` when no idle TTL is configured.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let ttl = self.retention.idle_ttl?;
        let period = (ttl / 2).max(MIN_SWEEP_INTERVAL);
        let store = Arc::clone(self);

        tracing::debug!(ttl_secs = ttl.as_secs(), "starting session sweeper");
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                store.evict_expired().await;
            }
        }))
    }
}

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Last activity of a session nobody outside the map holds
///
/// Handles are only cloned out under the map lock, so with the write lock
/// held a strong count of one means no turn is pending on the session,
/// locked or not.
fn idle_activity(handle: &SessionHandle) -> Option<DateTime<Utc>> {
    if Arc::strong_count(handle) > 1 {
        return None;
    }
    handle.try_lock().ok().map(|session| session.last_activity_at)
}

/// Remove the least recently active session not in use
fn evict_least_recent(sessions: &mut HashMap<String, SessionHandle>) -> bool {
    let oldest = sessions
        .iter()
        .filter_map(|(id, handle)| idle_activity(handle).map(|last| (id.clone(), last)))
        .min_by_key(|(_, last_activity)| *last_activity)
        .map(|(id, _)| id);

    oldest.is_some_and(|id| {
        tracing::debug!(session_id = %id, "evicting least recently active session");
        sessions.remove(&id).is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_has_empty_history() {
        let store = SessionStore::default();
        assert!(store.history("never-seen").await.is_empty());
        // Reading history does not create the session
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn get_or_create_is_lazy_and_stable() {
        let store = SessionStore::default();
        let first = store.get_or_create("s1").await;
        assert_eq!(first.id, "s1");
        assert!(first.messages.is_empty());
        assert_eq!(first.created_at, first.last_activity_at);

        let again = store.get_or_create("s1").await;
        assert_eq!(again.created_at, first.created_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn append_keeps_order_and_touches_activity() {
        let store = SessionStore::default();
        let created = store.get_or_create("s1").await;

        store.append("s1", ConversationMessage::user("hello")).await;
        store.append("s1", ConversationMessage::assistant("hi there")).await;

        let session = store.get_or_create("s1").await;
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["hello", "hi there"]);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert!(session.last_activity_at >= created.last_activity_at);
    }

    #[tokio::test]
    async fn context_window_keeps_most_recent_in_order() {
        let store = SessionStore::default();
        for i in 0..11 {
            store.append("s1", ConversationMessage::user(format!("m{i}"))).await;
        }

        let window = store.context_window("s1", 10).await;
        let contents: Vec<_> = window.iter().map(|m| m.content.clone()).collect();
        let expected: Vec<_> = (1..11).map(|i| format!("m{i}")).collect();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn context_window_shorter_than_history_limit() {
        let store = SessionStore::default();
        store.append("s1", ConversationMessage::user("only")).await;
        assert_eq!(store.context_window("s1", 10).await.len(), 1);
        assert!(store.context_window("missing", 10).await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::default();
        store.append("a", ConversationMessage::user("for a")).await;
        store.append("b", ConversationMessage::user("for b")).await;

        assert_eq!(store.history("a").await[0].content, "for a");
        assert_eq!(store.history("b").await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let store = Arc::new(SessionStore::default());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.append("shared", ConversationMessage::user(format!("m{i}"))).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.history("shared").await.len(), 20);
    }

    #[tokio::test]
    async fn max_sessions_evicts_least_recent() {
        let store = SessionStore::new(RetentionPolicy {
            max_sessions: Some(2),
            idle_ttl: None,
        });

        store.append("old", ConversationMessage::user("1")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("newer", ConversationMessage::user("2")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("newest", ConversationMessage::user("3")).await;

        assert_eq!(store.len().await, 2);
        assert!(store.history("old").await.is_empty());
        assert_eq!(store.history("newest").await.len(), 1);
    }

    #[tokio::test]
    async fn evict_expired_drops_idle_sessions() {
        let store = SessionStore::new(RetentionPolicy {
            max_sessions: None,
            idle_ttl: Some(Duration::from_millis(20)),
        });

        store.append("idle", ConversationMessage::user("bye")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.append("fresh", ConversationMessage::user("hi")).await;

        assert_eq!(store.evict_expired().await, 1);
        assert!(store.history("idle").await.is_empty());
        assert_eq!(store.history("fresh").await.len(), 1);
    }

    #[tokio::test]
    async fn evict_expired_keeps_sessions_in_use() {
        let store = SessionStore::new(RetentionPolicy {
            max_sessions: None,
            idle_ttl: Some(Duration::from_millis(1)),
        });

        let handle = store.handle("busy").await;
        let _guard = handle.lock().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.evict_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn pending_handle_survives_capacity_eviction() {
        let store = SessionStore::new(RetentionPolicy {
            max_sessions: Some(1),
            idle_ttl: None,
        });

        // Handle taken but not yet locked, as between lookup and lock in a turn
        let pending = store.handle("a").await;
        store.handle("b").await;
        pending.lock().await.push(ConversationMessage::user("kept"));

        assert_eq!(store.history("a").await.len(), 1);
        let again = store.handle("a").await;
        assert!(Arc::ptr_eq(&pending, &again));
    }

    #[tokio::test]
    async fn pending_handle_survives_idle_sweep() {
        let store = SessionStore::new(RetentionPolicy {
            max_sessions: None,
            idle_ttl: Some(Duration::from_millis(1)),
        });

        let pending = store.handle("a").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.evict_expired().await, 0);

        pending.lock().await.push(ConversationMessage::user("kept"));
        drop(pending);
        assert_eq!(store.history("a").await.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_only_runs_with_ttl() {
        let store = Arc::new(SessionStore::default());
        assert!(store.spawn_sweeper().is_none());

        let store = Arc::new(SessionStore::new(RetentionPolicy {
            max_sessions: None,
            idle_ttl: Some(Duration::from_secs(60)),
        }));
        let sweeper = store.spawn_sweeper().unwrap();
        sweeper.abort();
    }

    #[tokio::test]
    async fn unbounded_by_default() {
        let store = SessionStore::default();
        for i in 0..50 {
            store.get_or_create(&format!("s{i}")).await;
        }
        assert_eq!(store.evict_expired().await, 0);
        assert_eq!(store.len().await, 50);
    }
}
