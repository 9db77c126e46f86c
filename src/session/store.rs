//! Session store contract and the in-memory implementation.
//!
//! The store owns the only mutable state in the engine: one row per live
//! session. `rotate` is the compare-and-swap primitive the whole design leans
//! on; it must be a single atomic conditional update, never a read followed
//! by a write, so that two requests racing to redeem the same refresh token
//! can never both win.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::token::unix_now;

/// Durable record of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable for the session's entire lifetime, never reused after deletion.
    pub id: Uuid,
    /// Identifies the currently valid refresh credential; replaced on every
    /// successful rotation.
    pub generation: Uuid,
    pub subject_id: Uuid,
    pub created_at_unix: i64,
    pub last_activity_at_unix: i64,
}

/// Result of a conditional rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The stored generation matched; the session now carries the new one.
    Rotated(Session),
    /// No session with that id exists (logged out or swept).
    NotFound,
    /// The stored generation differs from the expected one. Nothing was
    /// mutated; the lifecycle engine treats this as the fraud signal.
    GenerationMismatch,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with a fresh id and generation.
    async fn create(&self, subject_id: Uuid) -> Result<Session>;

    /// Look up a session by its id.
    async fn get(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Look up the session currently holding `generation`, if any.
    async fn find_by_generation(&self, generation: Uuid) -> Result<Option<Session>>;

    /// Atomically replace the generation if it still equals
    /// `expected_generation`, bumping `last_activity_at` on success.
    async fn rotate(&self, session_id: Uuid, expected_generation: Uuid) -> Result<RotateOutcome>;

    /// Idempotent removal; absent sessions are not an error.
    async fn delete(&self, session_id: Uuid) -> Result<()>;

    /// Number of live sessions for a subject, used only for limit checks.
    async fn active_count_for_subject(&self, subject_id: Uuid) -> Result<i64>;

    /// Bulk sweep of sessions older than `max_age_seconds`. Returns the
    /// number of sessions removed.
    async fn delete_older_than(&self, max_age_seconds: i64) -> Result<u64>;
}

/// In-memory store for local development and tests.
///
/// The mutex serializes every operation, which makes `rotate` trivially
/// atomic. The Postgres store achieves the same with a conditional UPDATE.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind a session's clock fields. Test-only; real timestamps are
    /// owned by the store.
    #[cfg(test)]
    pub(crate) async fn set_timestamps(
        &self,
        session_id: Uuid,
        created_at_unix: i64,
        last_activity_at_unix: i64,
    ) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.created_at_unix = created_at_unix;
            session.last_activity_at_unix = last_activity_at_unix;
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, subject_id: Uuid) -> Result<Session> {
        let now = unix_now();
        let session = Session {
            id: Uuid::now_v7(),
            generation: Uuid::new_v4(),
            subject_id,
            created_at_unix: now,
            last_activity_at_unix: now,
        };
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn find_by_generation(&self, generation: Uuid) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|session| session.generation == generation)
            .cloned())
    }

    async fn rotate(&self, session_id: Uuid, expected_generation: Uuid) -> Result<RotateOutcome> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return Ok(RotateOutcome::NotFound);
        };
        if session.generation != expected_generation {
            return Ok(RotateOutcome::GenerationMismatch);
        }
        session.generation = Uuid::new_v4();
        // last_activity_at is monotonically non-decreasing.
        session.last_activity_at_unix = session.last_activity_at_unix.max(unix_now());
        Ok(RotateOutcome::Rotated(session.clone()))
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&session_id);
        Ok(())
    }

    async fn active_count_for_subject(&self, subject_id: Uuid) -> Result<i64> {
        let sessions = self.sessions.lock().await;
        let count = sessions
            .values()
            .filter(|session| session.subject_id == subject_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn delete_older_than(&self, max_age_seconds: i64) -> Result<u64> {
        let cutoff = unix_now() - max_age_seconds;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.created_at_unix >= cutoff);
        Ok(u64::try_from(before - sessions.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn create_assigns_distinct_ids_and_generations() -> Result<()> {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        let first = store.create(subject).await?;
        let second = store.create(subject).await?;

        assert_ne!(first.id, second.id);
        assert_ne!(first.generation, second.generation);
        assert_eq!(first.created_at_unix, first.last_activity_at_unix);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_swaps_generation_only_on_match() -> Result<()> {
        let store = MemorySessionStore::new();
        let session = store.create(Uuid::new_v4()).await?;

        let outcome = store.rotate(session.id, session.generation).await?;
        let rotated = match outcome {
            RotateOutcome::Rotated(rotated) => rotated,
            other => panic!("expected rotation, got {other:?}"),
        };
        assert_ne!(rotated.generation, session.generation);

        // The old generation is spent; presenting it again must not mutate.
        let replay = store.rotate(session.id, session.generation).await?;
        assert_eq!(replay, RotateOutcome::GenerationMismatch);

        let stored = store.get(session.id).await?.expect("session exists");
        assert_eq!(stored.generation, rotated.generation);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_missing_session_is_not_found() -> Result<()> {
        let store = MemorySessionStore::new();
        let outcome = store.rotate(Uuid::now_v7(), Uuid::new_v4()).await?;
        assert_eq!(outcome, RotateOutcome::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn delete_is_idempotent() -> Result<()> {
        let store = MemorySessionStore::new();
        let session = store.create(Uuid::new_v4()).await?;

        store.delete(session.id).await?;
        store.delete(session.id).await?;
        assert!(store.get(session.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn counts_are_scoped_per_subject() -> Result<()> {
        let store = MemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.create(alice).await?;
        store.create(alice).await?;
        store.create(bob).await?;

        assert_eq!(store.active_count_for_subject(alice).await?, 2);
        assert_eq!(store.active_count_for_subject(bob).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_only_aged_sessions() -> Result<()> {
        let store = MemorySessionStore::new();
        let old = store.create(Uuid::new_v4()).await?;
        let fresh = store.create(Uuid::new_v4()).await?;
        store
            .set_timestamps(old.id, unix_now() - 1000, unix_now() - 1000)
            .await;

        let removed = store.delete_older_than(500).await?;
        assert_eq!(removed, 1);
        assert!(store.get(old.id).await?.is_none());
        assert!(store.get(fresh.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn find_by_generation_tracks_rotation() -> Result<()> {
        let store = MemorySessionStore::new();
        let session = store.create(Uuid::new_v4()).await?;

        let found = store.find_by_generation(session.generation).await?;
        assert_eq!(found.as_ref().map(|s| s.id), Some(session.id));

        let RotateOutcome::Rotated(rotated) = store.rotate(session.id, session.generation).await?
        else {
            panic!("rotation should succeed");
        };
        assert!(store.find_by_generation(session.generation).await?.is_none());
        assert!(store.find_by_generation(rotated.generation).await?.is_some());
        Ok(())
    }
}
