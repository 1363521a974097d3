use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session is not in progress")]
    NotInProgress,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a training attempt.
///
/// `InProgress` is the only mutable state; `Finished` and `Canceled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Finished,
    Canceled,
}

impl SessionStatus {
    /// Storage representation of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Canceled => "canceled",
        }
    }

    /// Parses a persisted status string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

//
// ─── TRAINING SESSION ──────────────────────────────────────────────────────────
//

/// One attempt by a user at working through a suite.
///
/// `current_index` is a zero-based position in the suite's active-question
/// ordering. The ordering itself is never stored on the session; callers
/// recompute it against the catalog on every read, so a catalog sync that
/// retires questions mid-session simply shifts what the index points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSession {
    id: SessionId,
    user_id: UserId,
    suite: String,
    status: SessionStatus,
    current_index: u32,
    draft_answer: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TrainingSession {
    /// Starts a fresh attempt at position zero with an empty draft.
    #[must_use]
    pub fn new(id: SessionId, user_id: UserId, suite: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            suite: suite.into(),
            status: SessionStatus::InProgress,
            current_index: 0,
            draft_answer: None,
            started_at: now,
            finished_at: None,
        }
    }

    /// Rehydrates a session from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        suite: String,
        status: SessionStatus,
        current_index: u32,
        draft_answer: Option<String>,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            suite,
            status,
            current_index,
            draft_answer,
            started_at,
            finished_at,
        }
    }

    /// Appends one transport message to the draft answer.
    ///
    /// Input is trimmed; a blank message is a silent no-op (`Ok(false)`),
    /// matching a transport that may deliver empty frames. Non-blank parts
    /// are joined with `'\n'` in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotInProgress` for finished or canceled
    /// sessions.
    pub fn append_draft(&mut self, text: &str) -> Result<bool, SessionStateError> {
        self.require_in_progress()?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }

        self.draft_answer = match self.draft_answer.as_deref() {
            Some(current) if !current.is_empty() => Some(format!("{current}\n{trimmed}")),
            _ => Some(trimmed.to_string()),
        };
        Ok(true)
    }

    /// Moves to the next position and clears the draft.
    ///
    /// The caller materializes the draft into an answer snapshot *before*
    /// advancing; this method only performs the state transition.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotInProgress` for finished or canceled
    /// sessions.
    pub fn advance(&mut self) -> Result<(), SessionStateError> {
        self.require_in_progress()?;
        self.current_index += 1;
        self.draft_answer = None;
        Ok(())
    }

    /// Transitions to `Finished`, stamping `finished_at` and clearing the
    /// draft. Terminal: a second call fails rather than silently succeeding.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotInProgress` for finished or canceled
    /// sessions.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.require_in_progress()?;
        self.status = SessionStatus::Finished;
        self.finished_at = Some(now);
        self.draft_answer = None;
        Ok(())
    }

    /// Transitions to `Canceled`. Happens as a side effect of the user
    /// starting a new attempt while this one is live.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NotInProgress` for finished or canceled
    /// sessions.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.require_in_progress()?;
        self.status = SessionStatus::Canceled;
        self.finished_at = Some(now);
        self.draft_answer = None;
        Ok(())
    }

    /// The draft with outer whitespace removed, `None` when blank.
    #[must_use]
    pub fn trimmed_draft(&self) -> Option<&str> {
        self.draft_answer
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    fn require_in_progress(&self) -> Result<(), SessionStateError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionStateError::NotInProgress)
        }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    #[must_use]
    pub fn draft_answer(&self) -> Option<&str> {
        self.draft_answer.as_deref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{SessionId, UserId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn session() -> TrainingSession {
        TrainingSession::new(SessionId::new(), UserId::new(100), "mos", fixed_now())
    }

    #[test]
    fn append_draft_joins_parts_with_newline() {
        let mut s = session();
        assert!(s.append_draft("a").unwrap());
        assert!(s.append_draft("b").unwrap());
        assert_eq!(s.draft_answer(), Some("a\nb"));
    }

    #[test]
    fn append_draft_trims_and_ignores_blank_input() {
        let mut s = session();
        assert!(!s.append_draft("   \t\n").unwrap());
        assert_eq!(s.draft_answer(), None);

        assert!(s.append_draft("  hello  ").unwrap());
        assert_eq!(s.draft_answer(), Some("hello"));
    }

    #[test]
    fn advance_increments_index_and_clears_draft() {
        let mut s = session();
        s.append_draft("a").unwrap();
        s.advance().unwrap();
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.draft_answer(), None);
    }

    #[test]
    fn finish_is_terminal() {
        let mut s = session();
        let done_at = fixed_now() + Duration::minutes(10);
        s.finish(done_at).unwrap();
        assert_eq!(s.status(), SessionStatus::Finished);
        assert_eq!(s.finished_at(), Some(done_at));

        assert_eq!(s.finish(done_at), Err(SessionStateError::NotInProgress));
        assert_eq!(s.append_draft("late"), Err(SessionStateError::NotInProgress));
        assert_eq!(s.advance(), Err(SessionStateError::NotInProgress));
    }

    #[test]
    fn cancel_stamps_finished_at_and_blocks_further_input() {
        let mut s = session();
        s.append_draft("pending").unwrap();
        s.cancel(fixed_now()).unwrap();
        assert_eq!(s.status(), SessionStatus::Canceled);
        assert!(s.finished_at().is_some());
        assert_eq!(s.draft_answer(), None);
        assert_eq!(s.cancel(fixed_now()), Err(SessionStateError::NotInProgress));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Finished,
            SessionStatus::Canceled,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }
}
