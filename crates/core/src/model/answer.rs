use chrono::{DateTime, Utc};

use crate::model::ids::{AnswerId, QuestionId, SessionId};
use crate::model::question::Question;
use crate::model::session::TrainingSession;

/// An immutable snapshot of one answered question.
///
/// `question_text_snapshot` preserves the wording shown to the user at
/// answer time, so catalog edits after the fact never rewrite history.
/// `question_id` is a weak reference: it may be absent when the user
/// answered past the end of the question list, and the store clears it if
/// the question row is ever removed by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    id: AnswerId,
    session_id: SessionId,
    question_id: Option<QuestionId>,
    question_text_snapshot: String,
    answer_text: String,
    created_at: DateTime<Utc>,
}

impl Answer {
    /// Converts a session's pending draft into a durable answer snapshot.
    ///
    /// `question` is the question that was current *before* the session
    /// advances. Past the end of the list the snapshot text is empty but
    /// the user's words are still kept. A blank trimmed draft produces no
    /// answer; advancing or finishing without typing anything is valid and
    /// silent.
    #[must_use]
    pub fn materialize(
        session: &TrainingSession,
        question: Option<&Question>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let draft = session.trimmed_draft()?;

        Some(Self {
            id: AnswerId::new(),
            session_id: session.id(),
            question_id: question.map(Question::id),
            question_text_snapshot: question.map(|q| q.text().to_string()).unwrap_or_default(),
            answer_text: draft.to_string(),
            created_at: now,
        })
    }

    /// Rehydrates an answer from persisted storage.
    #[must_use]
    pub fn from_persisted(
        id: AnswerId,
        session_id: SessionId,
        question_id: Option<QuestionId>,
        question_text_snapshot: String,
        answer_text: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id,
            question_id,
            question_text_snapshot,
            answer_text,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> AnswerId {
        self.id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn question_id(&self) -> Option<QuestionId> {
        self.question_id
    }

    #[must_use]
    pub fn question_text_snapshot(&self) -> &str {
        &self.question_text_snapshot
    }

    #[must_use]
    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::UserId;
    use crate::model::question::{Difficulty, QuestionDraft};
    use crate::time::fixed_now;

    fn question(code: &str, text: &str) -> Question {
        let draft = QuestionDraft::new(code, text, None, Difficulty::Basic).unwrap();
        Question::from_draft(QuestionId::new(), "mos", &draft, fixed_now())
    }

    fn session_with_draft(draft: &str) -> TrainingSession {
        let mut s = TrainingSession::new(SessionId::new(), UserId::new(1), "mos", fixed_now());
        s.append_draft(draft).unwrap();
        s
    }

    #[test]
    fn materialize_snapshots_current_question_text() {
        let q = question("mos_001", "What is ownership?");
        let s = session_with_draft("a\nb");

        let answer = Answer::materialize(&s, Some(&q), fixed_now()).unwrap();
        assert_eq!(answer.session_id(), s.id());
        assert_eq!(answer.question_id(), Some(q.id()));
        assert_eq!(answer.question_text_snapshot(), "What is ownership?");
        assert_eq!(answer.answer_text(), "a\nb");
    }

    #[test]
    fn materialize_past_end_keeps_text_with_empty_snapshot() {
        let s = session_with_draft("final thoughts");

        let answer = Answer::materialize(&s, None, fixed_now()).unwrap();
        assert_eq!(answer.question_id(), None);
        assert_eq!(answer.question_text_snapshot(), "");
        assert_eq!(answer.answer_text(), "final thoughts");
    }

    #[test]
    fn materialize_blank_draft_produces_nothing() {
        let q = question("mos_001", "Q");
        let s = TrainingSession::new(SessionId::new(), UserId::new(1), "mos", fixed_now());
        assert!(Answer::materialize(&s, Some(&q), fixed_now()).is_none());
    }
}
