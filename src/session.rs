//! In-memory session store keyed by `(user_id, challenge_id)`.
//!
//! At most one session per pair: inserting replaces. Sessions are evicted
//! explicitly or by the idle sweep.

use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::ChallengeSession;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub challenge_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, challenge_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            challenge_id: challenge_id.into(),
        }
    }

    pub fn of(session: &ChallengeSession) -> Self {
        Self::new(session.user_id.clone(), session.challenge_id.clone())
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, ChallengeSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `session`, returning the one it superseded.
    #[instrument(level = "debug", skip(self, session), fields(session_id = %session.id))]
    pub async fn insert(&self, session: ChallengeSession) -> Option<ChallengeSession> {
        let key = SessionKey::of(&session);
        let previous = self.sessions.write().await.insert(key, session);
        if let Some(prev) = &previous {
            debug!(target: "challenge", superseded = %prev.id, "Session replaced");
        }
        previous
    }

    pub async fn get(&self, key: &SessionKey) -> Option<ChallengeSession> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Applies `f` to the stored session and returns its result.
    pub async fn update<R>(&self, key: &SessionKey, f: impl FnOnce(&mut ChallengeSession) -> R) -> Option<R> {
        self.sessions.write().await.get_mut(key).map(f)
    }

    pub async fn evict(&self, key: &SessionKey) -> Option<ChallengeSession> {
        self.sessions.write().await.remove(key)
    }

    /// Drops sessions with no activity for longer than `ttl`. Returns how many went.
    #[instrument(level = "debug", skip(self))]
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now.signed_duration_since(s.last_activity_at) <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(target: "challenge", evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_replaces_same_pair() {
        let store = SessionStore::new();
        let first = ChallengeSession::new("c1", "u1");
        let second = ChallengeSession::new("c1", "u1");
        assert!(store.insert(first.clone()).await.is_none());
        let replaced = store.insert(second.clone()).await.unwrap();
        assert_eq!(replaced.id, first.id);
        assert_eq!(store.get(&SessionKey::new("u1", "c1")).await.unwrap().id, second.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn pairs_are_independent() {
        let store = SessionStore::new();
        store.insert(ChallengeSession::new("c1", "u1")).await;
        store.insert(ChallengeSession::new("c1", "u2")).await;
        store.insert(ChallengeSession::new("c2", "u1")).await;
        assert_eq!(store.len().await, 3);
        store.evict(&SessionKey::new("u1", "c1")).await.unwrap();
        assert!(store.get(&SessionKey::new("u1", "c1")).await.is_none());
        assert!(store.get(&SessionKey::new("u2", "c1")).await.is_some());
    }

    #[tokio::test]
    async fn update_mutates_in_place() {
        let store = SessionStore::new();
        store.insert(ChallengeSession::new("c1", "u1")).await;
        let key = SessionKey::new("u1", "c1");
        let unlocked = store.update(&key, |s| s.unlock_hint("h1")).await;
        assert_eq!(unlocked, Some(true));
        assert_eq!(store.get(&key).await.unwrap().hints_unlocked, vec!["h1"]);
        assert_eq!(store.update(&SessionKey::new("x", "y"), |s| s.attempts).await, None);
    }

    #[tokio::test]
    async fn idle_sessions_are_swept() {
        let store = SessionStore::new();
        let mut stale = ChallengeSession::new("c1", "u1");
        stale.last_activity_at = Utc::now() - chrono::Duration::hours(2);
        store.insert(stale).await;
        store.insert(ChallengeSession::new("c2", "u1")).await;
        assert_eq!(store.evict_idle(Duration::from_secs(3600)).await, 1);
        assert!(store.get(&SessionKey::new("u1", "c2")).await.is_some());
    }
}
