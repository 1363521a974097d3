use std::sync::Arc;

use tracing::debug;

use storage::repository::{QuestionRepository, SessionRepository, StorageError};
use trainer_core::model::{Answer, Question, SessionId, TrainingSession, UserId};

use crate::Clock;
use crate::error::FlowError;

/// The training session state machine.
///
/// Owns start, draft accumulation, advancing, and finishing. Each public
/// operation runs as one unit of work against the store; the store's guarded
/// commits keep duplicate transport deliveries from materializing the same
/// draft twice.
#[derive(Clone)]
pub struct SessionFlowService {
    clock: Clock,
    questions: Arc<dyn QuestionRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl SessionFlowService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            clock,
            questions,
            sessions,
        }
    }

    /// Start a new attempt at the given suite.
    ///
    /// Any in-progress session of the user, in any suite, is canceled in the
    /// same unit of work: a user has at most one live attempt.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NoActiveQuestions` when the suite has nothing to
    /// ask; no session is created in that case.
    pub async fn start(&self, user_id: UserId, suite: &str) -> Result<TrainingSession, FlowError> {
        if self.questions.count_active(suite).await? == 0 {
            return Err(FlowError::NoActiveQuestions {
                suite: suite.to_string(),
            });
        }

        let now = self.clock.now();
        let session = TrainingSession::new(SessionId::new(), user_id, suite, now);
        let canceled = self
            .sessions
            .insert_session_replacing_active(&session, now)
            .await?;
        if canceled > 0 {
            debug!(user_id = %user_id, canceled, "canceled stale attempts on start");
        }
        Ok(session)
    }

    /// The question at the session's current position, or `Ok(None)` when the
    /// session has walked past the end of the suite.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::SessionNotFound` / `FlowError::NotInProgress` for
    /// unknown or closed sessions.
    pub async fn current_question(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Question>, FlowError> {
        let session = self.load_in_progress(session_id).await?;
        self.question_at(&session).await
    }

    /// Append one message to the session's draft answer.
    ///
    /// The input is trimmed; a blank message is a silent no-op, matching a
    /// transport that may deliver empty frames. Non-blank parts accumulate
    /// in arrival order, newline-separated.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::SessionNotFound` / `FlowError::NotInProgress` for
    /// unknown or closed sessions.
    pub async fn append_to_draft(
        &self,
        session_id: SessionId,
        text: &str,
    ) -> Result<(), FlowError> {
        let session = self.load_in_progress(session_id).await?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        // The store refuses the append if the session closed between our
        // read and the write.
        if !self.sessions.append_draft(session.id(), trimmed).await? {
            return Err(FlowError::NotInProgress);
        }
        Ok(())
    }

    /// Snapshot the pending draft (if any) against the current question,
    /// advance to the next position, and return the new current question.
    ///
    /// Past the end of the list a non-blank draft is still snapshotted, with
    /// an empty question text.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Conflict` when a concurrent caller committed the
    /// same session first; nothing is written in that case.
    pub async fn next(&self, session_id: SessionId) -> Result<Option<Question>, FlowError> {
        let observed = self.load_in_progress(session_id).await?;
        let current = self.question_at(&observed).await?;

        let answer = Answer::materialize(&observed, current.as_ref(), self.clock.now());
        let mut session = observed.clone();
        session.advance()?;

        self.sessions
            .commit_transition(&session, observed.current_index(), answer.as_ref())
            .await
            .map_err(map_commit)?;

        self.question_at(&session).await
    }

    /// Snapshot any remaining draft and close the session as finished.
    ///
    /// Deliberately not reentrant: finishing an already-finished session
    /// fails instead of silently succeeding, since a second pass could
    /// duplicate an answer snapshot.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotInProgress` for closed sessions and
    /// `FlowError::Conflict` when a concurrent caller got there first.
    pub async fn finish(&self, session_id: SessionId) -> Result<(), FlowError> {
        let observed = self.load_in_progress(session_id).await?;
        let current = self.question_at(&observed).await?;

        let now = self.clock.now();
        let answer = Answer::materialize(&observed, current.as_ref(), now);
        let mut session = observed.clone();
        session.finish(now)?;

        self.sessions
            .commit_transition(&session, observed.current_index(), answer.as_ref())
            .await
            .map_err(map_commit)?;
        Ok(())
    }

    /// The session's persisted answer snapshots in creation order.
    ///
    /// Works for closed sessions too; transports use it for recaps.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::SessionNotFound` for unknown sessions.
    pub async fn answers(&self, session_id: SessionId) -> Result<Vec<Answer>, FlowError> {
        if self.sessions.get_session(session_id).await?.is_none() {
            return Err(FlowError::SessionNotFound);
        }
        Ok(self.sessions.answers_for_session(session_id).await?)
    }

    async fn load_in_progress(&self, id: SessionId) -> Result<TrainingSession, FlowError> {
        let session = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(FlowError::SessionNotFound)?;
        if !session.is_in_progress() {
            return Err(FlowError::NotInProgress);
        }
        Ok(session)
    }

    /// Resolves the session's position against the suite's active-question
    /// ordering (by `code` ascending).
    ///
    /// The ordering is recomputed from the catalog on every call, never
    /// cached on the session: a catalog sync may retire or reword questions
    /// while the session is live, and the position is a position in the
    /// *current* ordering.
    async fn question_at(&self, session: &TrainingSession) -> Result<Option<Question>, FlowError> {
        let ordered = self.questions.active_questions(session.suite()).await?;
        Ok(ordered.into_iter().nth(session.current_index() as usize))
    }
}

fn map_commit(err: StorageError) -> FlowError {
    match err {
        StorageError::Conflict => FlowError::Conflict,
        other => FlowError::Storage(other),
    }
}
