use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use trainer_core::CatalogDiff;
use trainer_core::model::{Answer, Question, SessionId, TrainingSession};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A guarded write lost a race against a concurrent writer; the caller's
    /// view of the row is stale.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for the question catalog.
///
/// Catalog rows are only ever written through `apply_catalog_diff`; the
/// session flow treats them as read-only.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Fetch every question of a suite, active or retired. Reconciler input.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn questions_for_suite(&self, suite: &str) -> Result<Vec<Question>, StorageError>;

    /// Fetch the suite's active questions ordered by `code` ascending.
    ///
    /// This is the deterministic session ordering; it is recomputed from the
    /// catalog on every call and never cached on a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn active_questions(&self, suite: &str) -> Result<Vec<Question>, StorageError>;

    /// Count the suite's active questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn count_active(&self, suite: &str) -> Result<u64, StorageError>;

    /// Apply a planned reconciliation as one all-or-nothing unit of work.
    ///
    /// A failure leaves the suite's catalog untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any row write fails.
    async fn apply_catalog_diff(&self, diff: &CatalogDiff) -> Result<(), StorageError>;
}

/// Repository contract for training sessions and their answer snapshots.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Atomically cancel any in-progress sessions of the new session's user
    /// (stamping `finished_at = now`) and insert the new session.
    ///
    /// Returns how many sessions were canceled. The single unit of work is
    /// what keeps "at most one live attempt per user" crash-safe.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn insert_session_replacing_active(
        &self,
        session: &TrainingSession,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Fetch a session by id. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError>;

    /// Append one already-trimmed, non-blank message part to an in-progress
    /// session's draft, joined with `'\n'`.
    ///
    /// The concatenation happens inside the store, so two concurrent
    /// transport deliveries cannot lose each other's part. Returns `false`
    /// when the session is missing or no longer in progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn append_draft(&self, id: SessionId, part: &str) -> Result<bool, StorageError>;

    /// Persist a computed session transition, plus the answer snapshot it
    /// materialized (if any), in one unit of work.
    ///
    /// The write is guarded by the state the transition was computed from:
    /// it only lands if the stored row is still in progress at
    /// `observed_index`. A concurrent writer makes the guard fail with
    /// `StorageError::Conflict`, which is what prevents the same draft from
    /// being materialized twice.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the guard fails, or other storage
    /// errors.
    async fn commit_transition(
        &self,
        session: &TrainingSession,
        observed_index: u32,
        answer: Option<&Answer>,
    ) -> Result<(), StorageError>;

    /// Fetch a session's answer snapshots in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the read fails.
    async fn answers_for_session(&self, id: SessionId) -> Result<Vec<Answer>, StorageError>;

    /// Remove a session. Its answers go with it (owning relationship).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<HashMap<(String, String), Question>>>,
    sessions: Arc<Mutex<HashMap<SessionId, TrainingSession>>>,
    answers: Arc<Mutex<Vec<Answer>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn questions_for_suite(&self, suite: &str) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|q| q.suite() == suite)
            .cloned()
            .collect())
    }

    async fn active_questions(&self, suite: &str) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut out: Vec<Question> = guard
            .values()
            .filter(|q| q.suite() == suite && q.is_active())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(out)
    }

    async fn count_active(&self, suite: &str) -> Result<u64, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|q| q.suite() == suite && q.is_active())
            .count() as u64)
    }

    async fn apply_catalog_diff(&self, diff: &CatalogDiff) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for q in diff
            .created
            .iter()
            .chain(diff.updated.iter())
            .chain(diff.deactivated.iter())
        {
            guard.insert((q.suite().to_string(), q.code().to_string()), q.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session_replacing_active(
        &self,
        session: &TrainingSession,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut canceled = 0_u64;
        for existing in guard.values_mut() {
            if existing.user_id() == session.user_id() && existing.is_in_progress() {
                existing
                    .cancel(now)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                canceled += 1;
            }
        }

        guard.insert(session.id(), session.clone());
        Ok(canceled)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn append_draft(&self, id: SessionId, part: &str) -> Result<bool, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let Some(session) = guard.get_mut(&id) else {
            return Ok(false);
        };
        match session.append_draft(part) {
            Ok(appended) => Ok(appended),
            Err(_) => Ok(false),
        }
    }

    async fn commit_transition(
        &self,
        session: &TrainingSession,
        observed_index: u32,
        answer: Option<&Answer>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(stored) = guard.get_mut(&session.id()) else {
            return Err(StorageError::Conflict);
        };
        if !stored.is_in_progress() || stored.current_index() != observed_index {
            return Err(StorageError::Conflict);
        }
        *stored = session.clone();
        drop(guard);

        if let Some(answer) = answer {
            let mut answers = self
                .answers
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            answers.push(answer.clone());
        }
        Ok(())
    }

    async fn answers_for_session(&self, id: SessionId) -> Result<Vec<Answer>, StorageError> {
        let guard = self
            .answers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|a| a.session_id() == id)
            .cloned()
            .collect())
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        drop(guard);

        let mut answers = self
            .answers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        answers.retain(|a| a.session_id() != id);
        Ok(())
    }
}

/// Aggregates catalog and session repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo);
        Self {
            questions,
            sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainer_core::model::{Difficulty, QuestionDraft, QuestionId, UserId};
    use trainer_core::time::fixed_now;

    fn seed_diff(suite: &str, codes: &[&str]) -> CatalogDiff {
        let now = fixed_now();
        let created = codes
            .iter()
            .map(|code| {
                let draft =
                    QuestionDraft::new(*code, format!("text {code}"), None, Difficulty::Basic)
                        .unwrap();
                trainer_core::model::Question::from_draft(QuestionId::new(), suite, &draft, now)
            })
            .collect();
        CatalogDiff {
            created,
            ..CatalogDiff::default()
        }
    }

    #[tokio::test]
    async fn active_questions_are_ordered_by_code() {
        let repo = InMemoryRepository::new();
        repo.apply_catalog_diff(&seed_diff("mos", &["mos_003", "mos_001", "mos_002"]))
            .await
            .unwrap();

        let active = repo.active_questions("mos").await.unwrap();
        let codes: Vec<&str> = active.iter().map(|q| q.code()).collect();
        assert_eq!(codes, vec!["mos_001", "mos_002", "mos_003"]);
        assert_eq!(repo.count_active("mos").await.unwrap(), 3);
        assert_eq!(repo.count_active("ed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replacing_insert_cancels_previous_attempt() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let first = TrainingSession::new(SessionId::new(), UserId::new(7), "mos", now);
        repo.insert_session_replacing_active(&first, now)
            .await
            .unwrap();

        let second = TrainingSession::new(SessionId::new(), UserId::new(7), "ed", now);
        let canceled = repo
            .insert_session_replacing_active(&second, now)
            .await
            .unwrap();
        assert_eq!(canceled, 1);

        let stored_first = repo.get_session(first.id()).await.unwrap().unwrap();
        assert!(!stored_first.is_in_progress());
        assert_eq!(stored_first.finished_at(), Some(now));
    }

    #[tokio::test]
    async fn commit_transition_rejects_stale_observations() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let mut session = TrainingSession::new(SessionId::new(), UserId::new(7), "mos", now);
        repo.insert_session_replacing_active(&session, now)
            .await
            .unwrap();

        let observed = session.current_index();
        session.advance().unwrap();
        repo.commit_transition(&session, observed, None)
            .await
            .unwrap();

        // Same observation again: the stored index has moved on.
        let err = repo
            .commit_transition(&session, observed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn deleting_a_session_removes_its_answers() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let mut session = TrainingSession::new(SessionId::new(), UserId::new(7), "mos", now);
        repo.insert_session_replacing_active(&session, now)
            .await
            .unwrap();

        session.append_draft("draft").unwrap();
        let answer = Answer::materialize(&session, None, now).unwrap();
        let observed = session.current_index();
        session.advance().unwrap();
        repo.commit_transition(&session, observed, Some(&answer))
            .await
            .unwrap();
        assert_eq!(repo.answers_for_session(session.id()).await.unwrap().len(), 1);

        repo.delete_session(session.id()).await.unwrap();
        assert!(repo.answers_for_session(session.id()).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_session(session.id()).await,
            Err(StorageError::NotFound)
        ));
    }
}
