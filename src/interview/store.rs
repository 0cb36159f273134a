//! Session store: the single owner of live sessions.
//!
//! Callers work on a cloned snapshot and write it back with `replace`, which
//! only succeeds if nobody else replaced the session in between.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::session::Session;
use crate::platform::ParticipantId;

/// A `replace` lost a race with another writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreConflict {
    #[error("No session for {0}")]
    Missing(ParticipantId),

    #[error("Session for {participant} moved on (expected revision {expected}, found {found})")]
    Stale {
        participant: ParticipantId,
        expected: u64,
        found: u64,
    },
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Snapshot of the participant's session.
    async fn get(&self, participant: &ParticipantId) -> Option<Session>;

    async fn contains(&self, participant: &ParticipantId) -> bool;

    /// Insert unless the participant already has a session. Returns whether
    /// the session was stored.
    async fn insert_if_absent(&self, session: Session) -> bool;

    /// Write back a snapshot taken at `session.revision`. On success the
    /// stored copy carries the next revision, which is returned.
    async fn replace(&self, session: &Session) -> Result<u64, StoreConflict>;

    /// Fold data store entries into the stored session without a revision
    /// check. Returns false if the session is gone or was replaced by
    /// another one.
    async fn merge_data(
        &self,
        participant: &ParticipantId,
        session_id: Uuid,
        data: BTreeMap<String, serde_json::Value>,
    ) -> bool;

    async fn remove(&self, participant: &ParticipantId) -> Option<Session>;

    /// Remove the participant's session only if it is still `session_id`.
    async fn remove_if_session(&self, participant: &ParticipantId, session_id: Uuid) -> Option<Session>;

    async fn participants(&self) -> Vec<ParticipantId>;

    async fn len(&self) -> usize;
}

/// Store backed by one map behind one mutex. The lock is never held across
/// an await point.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<ParticipantId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ParticipantId, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, participant: &ParticipantId) -> Option<Session> {
        self.sessions().get(participant).cloned()
    }

    async fn contains(&self, participant: &ParticipantId) -> bool {
        self.sessions().contains_key(participant)
    }

    async fn insert_if_absent(&self, session: Session) -> bool {
        let mut sessions = self.sessions();
        if sessions.contains_key(&session.participant) {
            return false;
        }
        sessions.insert(session.participant.clone(), session);
        true
    }

    async fn replace(&self, session: &Session) -> Result<u64, StoreConflict> {
        let mut sessions = self.sessions();
        let stored = sessions
            .get_mut(&session.participant)
            .filter(|s| s.session_id == session.session_id)
            .ok_or_else(|| StoreConflict::Missing(session.participant.clone()))?;

        if stored.revision != session.revision {
            return Err(StoreConflict::Stale {
                participant: session.participant.clone(),
                expected: session.revision,
                found: stored.revision,
            });
        }

        let mut next = session.clone();
        next.revision = session.revision + 1;
        *stored = next;
        Ok(stored.revision)
    }

    async fn merge_data(
        &self,
        participant: &ParticipantId,
        session_id: Uuid,
        data: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        let mut sessions = self.sessions();
        match sessions.get_mut(participant) {
            Some(stored) if stored.session_id == session_id => {
                stored.data_store.extend(data);
                stored.revision += 1;
                true
            }
            _ => false,
        }
    }

    async fn remove(&self, participant: &ParticipantId) -> Option<Session> {
        self.sessions().remove(participant)
    }

    async fn remove_if_session(&self, participant: &ParticipantId, session_id: Uuid) -> Option<Session> {
        let mut sessions = self.sessions();
        if sessions.get(participant)?.session_id != session_id {
            return None;
        }
        sessions.remove(participant)
    }

    async fn participants(&self) -> Vec<ParticipantId> {
        let mut participants: Vec<_> = self.sessions().keys().cloned().collect();
        participants.sort();
        participants
    }

    async fn len(&self) -> usize {
        self.sessions().len()
    }
}
