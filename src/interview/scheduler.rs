//! Completion scheduler: deferred, cancellable purge of finished sessions.
//!
//! After an interview completes, the session and its private channel linger
//! for a grace window so the participant can read the summary. A pending
//! purge is keyed by participant and tagged with the session it belongs to,
//! so it can be cancelled and never removes a newer session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::SessionPhase;
use super::store::SessionStore;
use crate::platform::{ChannelRef, ParticipantId, Platform};

/// Default grace window between completion and purge.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

struct PendingPurge {
    session_id: Uuid,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<ParticipantId, PendingPurge>>>;

pub struct PurgeScheduler {
    grace: Duration,
    store: Arc<dyn SessionStore>,
    platform: Arc<dyn Platform>,
    pending: PendingMap,
}

impl PurgeScheduler {
    pub fn new(grace: Duration, store: Arc<dyn SessionStore>, platform: Arc<dyn Platform>) -> Self {
        Self {
            grace,
            store,
            platform,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<ParticipantId, PendingPurge>> {
        pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Purge `session_id` and delete `channel` once the grace window has
    /// passed. Replaces any purge already pending for the participant.
    pub fn schedule(&self, participant: ParticipantId, session_id: Uuid, channel: ChannelRef) {
        let grace = self.grace;
        let store = Arc::clone(&self.store);
        let platform = Arc::clone(&self.platform);
        let pending = Arc::clone(&self.pending);
        let task_participant = participant.clone();

        // Spawn while holding the lock so the task cannot look for its entry
        // before it has been inserted.
        let mut map = Self::lock(&self.pending);
        if let Some(previous) = map.remove(&participant) {
            previous.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            // Claim the entry. If it is gone or belongs to another session,
            // this purge was cancelled or superseded.
            {
                let mut map = Self::lock(&pending);
                match map.get(&task_participant) {
                    Some(entry) if entry.session_id == session_id => {
                        map.remove(&task_participant);
                    }
                    _ => return,
                }
            }

            purge(store.as_ref(), platform.as_ref(), &task_participant, session_id, &channel).await;
        });

        debug!(participant = %participant, session_id = %session_id, grace_secs = grace.as_secs(), "Purge scheduled");
        map.insert(participant, PendingPurge { session_id, handle });
    }

    /// Cancel the pending purge for a participant. Returns whether one was
    /// pending.
    pub fn cancel(&self, participant: &ParticipantId) -> bool {
        match Self::lock(&self.pending).remove(participant) {
            Some(entry) => {
                entry.handle.abort();
                debug!(participant = %participant, session_id = %entry.session_id, "Purge cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the pending purge only if it belongs to `session_id`.
    pub fn cancel_session(&self, participant: &ParticipantId, session_id: Uuid) -> bool {
        let mut map = Self::lock(&self.pending);
        match map.get(participant) {
            Some(entry) if entry.session_id == session_id => {
                if let Some(entry) = map.remove(participant) {
                    entry.handle.abort();
                }
                debug!(participant = %participant, session_id = %session_id, "Purge cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, participant: &ParticipantId) -> bool {
        Self::lock(&self.pending).contains_key(participant)
    }

    pub fn pending_count(&self) -> usize {
        Self::lock(&self.pending).len()
    }
}

async fn purge(
    store: &dyn SessionStore,
    platform: &dyn Platform,
    participant: &ParticipantId,
    session_id: Uuid,
    channel: &ChannelRef,
) {
    match store.remove_if_session(participant, session_id).await {
        Some(mut session) => {
            if let Err(e) = session.transition_to(SessionPhase::Purged) {
                warn!(participant = %participant, error = %e, "Purging session outside the completed phase");
            }
            info!(participant = %participant, session_id = %session_id, "Session purged");
        }
        None => debug!(participant = %participant, session_id = %session_id, "Session already gone"),
    }

    if let Err(e) = platform.delete_channel(channel).await {
        warn!(participant = %participant, channel = %channel, error = %e, "Failed to delete private channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::QuestionGraph;
    use crate::interview::session::Session;
    use crate::interview::store::InMemorySessionStore;
    use crate::platform::MemoryPlatform;

    async fn completed_session(
        store: &InMemorySessionStore,
        platform: &MemoryPlatform,
        participant: &ParticipantId,
    ) -> (Uuid, ChannelRef) {
        let graph = QuestionGraph::from_json(
            r#"{ "version": 1, "questions": [
                { "id": "q1", "order": 1, "type": "text_input", "text": "?" }
            ] }"#,
        )
        .unwrap();
        let channel = platform.create_private_channel(participant).await.unwrap();
        let mut session = Session::start(participant.clone(), channel.clone(), Arc::new(graph)).unwrap();
        session.transition_to(SessionPhase::Completed).unwrap();
        let id = session.session_id;
        store.insert_if_absent(session).await;
        (id, channel)
    }

    fn scheduler(store: &Arc<InMemorySessionStore>, platform: &Arc<MemoryPlatform>) -> PurgeScheduler {
        PurgeScheduler::new(DEFAULT_GRACE, store.clone(), platform.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn purges_after_grace_window() {
        let store = Arc::new(InMemorySessionStore::new());
        let platform = Arc::new(MemoryPlatform::new());
        let p = ParticipantId::from("p1");
        let (id, channel) = completed_session(&store, &platform, &p).await;

        let scheduler = scheduler(&store, &platform);
        scheduler.schedule(p.clone(), id, channel.clone());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(store.contains(&p).await);
        assert!(scheduler.is_pending(&p));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!store.contains(&p).await);
        assert_eq!(platform.deleted_channels(), vec![channel]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_purge_never_runs() {
        let store = Arc::new(InMemorySessionStore::new());
        let platform = Arc::new(MemoryPlatform::new());
        let p = ParticipantId::from("p1");
        let (id, channel) = completed_session(&store, &platform, &p).await;

        let scheduler = scheduler(&store, &platform);
        scheduler.schedule(p.clone(), id, channel);
        assert!(scheduler.cancel(&p));
        assert!(!scheduler.cancel(&p));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(store.contains(&p).await);
        assert!(platform.deleted_channels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_session_leaves_other_sessions_alone() {
        let store = Arc::new(InMemorySessionStore::new());
        let platform = Arc::new(MemoryPlatform::new());
        let p = ParticipantId::from("p1");
        let (id, channel) = completed_session(&store, &platform, &p).await;

        let scheduler = scheduler(&store, &platform);
        scheduler.schedule(p.clone(), id, channel);
        assert!(!scheduler.cancel_session(&p, Uuid::new_v4()));
        assert!(scheduler.is_pending(&p));
        assert!(scheduler.cancel_session(&p, id));
        assert!(!scheduler.is_pending(&p));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.contains(&p).await);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_spares_a_newer_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let platform = Arc::new(MemoryPlatform::new());
        let p = ParticipantId::from("p1");
        let (old_id, old_channel) = completed_session(&store, &platform, &p).await;

        let scheduler = scheduler(&store, &platform);
        scheduler.schedule(p.clone(), old_id, old_channel.clone());

        // The old session disappears and a fresh one takes its place.
        store.remove(&p).await;
        let (new_id, _) = completed_session(&store, &platform, &p).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.get(&p).await.unwrap().session_id, new_id);
        assert_eq!(platform.deleted_channels(), vec![old_channel]);
    }
}
