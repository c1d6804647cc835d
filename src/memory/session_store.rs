use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{new_session_id, Session, SessionData};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
}

/// Mutable bookkeeping next to an immutable session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    // ---
    pub status: SessionStatus,
    pub last_activity: DateTime<Utc>,
    pub context: Map<String, Value>,
}

#[derive(Debug)]
struct ActiveSession {
    session: Session,
    state: SessionState,
}

/// In-memory map of active sessions.
///
/// Single-process only: a multi-worker deployment needs the durable
/// [`MemoryBank`](super::MemoryBank) as the source of truth instead.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<String, ActiveSession>>,
}

impl SessionStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session from `data` and store it as active.
    pub async fn create(&self, user_id: &str, data: SessionData) -> String {
        // ---
        let session = Session {
            session_id: new_session_id(user_id),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            data_summary: data.summary,
            analysis_results: data.analysis,
            wellness_score: data.wellness_score,
            recommendations: data.recommendations,
        };
        self.insert(session).await
    }

    /// Store an already-built session as active, replacing any entry with the same id.
    pub async fn insert(&self, session: Session) -> String {
        // ---
        let session_id = session.session_id.clone();
        let state = SessionState {
            status: SessionStatus::Active,
            last_activity: Utc::now(),
            context: Map::new(),
        };
        self.inner
            .write()
            .await
            .insert(session_id.clone(), ActiveSession { session, state });

        debug!(%session_id, "session created");
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.read().await.get(session_id).map(|a| a.session.clone())
    }

    pub async fn state(&self, session_id: &str) -> Option<SessionState> {
        self.inner.read().await.get(session_id).map(|a| a.state.clone())
    }

    /// Merge `updates` into the session context. Returns false for unknown ids.
    pub async fn update_state(&self, session_id: &str, updates: Map<String, Value>) -> bool {
        self.touch(session_id, |state| state.context.extend(updates)).await
    }

    pub async fn pause(&self, session_id: &str) -> bool {
        self.touch(session_id, |state| state.status = SessionStatus::Paused)
            .await
    }

    pub async fn resume(&self, session_id: &str) -> bool {
        self.touch(session_id, |state| state.status = SessionStatus::Active)
            .await
    }

    /// Drop sessions idle for longer than `ttl`; returns how many were removed.
    pub async fn cleanup_expired(&self, ttl: Duration) -> usize {
        // ---
        match Utc::now().checked_sub_signed(ttl) {
            Some(cutoff) => self.cleanup_idle_before(cutoff).await,
            // Nothing can have been idle longer than the representable past.
            None => 0,
        }
    }

    async fn cleanup_idle_before(&self, cutoff: DateTime<Utc>) -> usize {
        // ---
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, active| active.state.last_activity >= cutoff);
        let removed = before - sessions.len();

        if removed > 0 {
            debug!(removed, "expired sessions evicted");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn touch<F>(&self, session_id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        // ---
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(session_id) {
            Some(active) => {
                apply(&mut active.state);
                active.state.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }
}
