use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question code cannot be empty")]
    EmptyCode,

    #[error("question text cannot be empty")]
    EmptyText,

    #[error("invalid difficulty value: {0}")]
    InvalidDifficulty(i64),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Three-level question difficulty, persisted as 1/2/3.
///
/// Source files may carry either the numeric form or the editor-facing
/// labels; anything unrecognized falls back to `Basic`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    #[default]
    Basic,
    Working,
    Advanced,
}

impl Difficulty {
    /// Normalizes a raw source token (numeric or labeled) to a difficulty.
    ///
    /// Trims and lowercases before matching. Unrecognized tokens map to
    /// `Basic` rather than failing, so a typo in one row cannot block a
    /// whole suite.
    #[must_use]
    pub fn from_token(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "2" | "рабочий" => Self::Working,
            "3" | "сложный" => Self::Advanced,
            _ => Self::Basic,
        }
    }

    /// Converts a persisted numeric difficulty (1-3) back to the enum.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidDifficulty` for values outside 1-3.
    pub fn from_i64(value: i64) -> Result<Self, QuestionError> {
        match value {
            1 => Ok(Self::Basic),
            2 => Ok(Self::Working),
            3 => Ok(Self::Advanced),
            _ => Err(QuestionError::InvalidDifficulty(value)),
        }
    }

    /// Maps this difficulty to its 1-3 storage representation.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Basic => 1,
            Self::Working => 2,
            Self::Advanced => 3,
        }
    }
}

//
// ─── QUESTION DRAFT ────────────────────────────────────────────────────────────
//

/// One validated record from an external question source.
///
/// Field trimming and required-field checks happen at construction, so the
/// reconciler only ever sees clean values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    code: String,
    text: String,
    topic: Option<String>,
    difficulty: Difficulty,
}

impl QuestionDraft {
    /// Builds a draft record, trimming every field.
    ///
    /// An empty-after-trim topic becomes `None`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyCode` / `QuestionError::EmptyText` if a
    /// required field is blank after trimming.
    pub fn new(
        code: impl Into<String>,
        text: impl Into<String>,
        topic: Option<String>,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        let code = code.into().trim().to_string();
        if code.is_empty() {
            return Err(QuestionError::EmptyCode);
        }
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }
        let topic = topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            code,
            text,
            topic,
            difficulty,
        })
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A catalog question, identified by `(suite, code)`.
///
/// Rows are never deleted; questions that disappear from the source are
/// deactivated so historical answer snapshots keep a valid reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    suite: String,
    code: String,
    text: String,
    topic: Option<String>,
    difficulty: Difficulty,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl Question {
    /// Creates an active question from a validated source draft.
    #[must_use]
    pub fn from_draft(
        id: QuestionId,
        suite: impl Into<String>,
        draft: &QuestionDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            suite: suite.into(),
            code: draft.code().to_string(),
            text: draft.text().to_string(),
            topic: draft.topic().map(str::to_string),
            difficulty: draft.difficulty(),
            is_active: true,
            updated_at: now,
        }
    }

    /// Rehydrates a question from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: QuestionId,
        suite: String,
        code: String,
        text: String,
        topic: Option<String>,
        difficulty: Difficulty,
        is_active: bool,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            suite,
            code,
            text,
            topic,
            difficulty,
            is_active,
            updated_at,
        }
    }

    /// Overwrites mutable fields from a source draft, reactivating the row
    /// if it had been retired.
    ///
    /// Returns `true` when anything actually changed; an unchanged question
    /// keeps its `updated_at`.
    pub fn apply_source(&mut self, draft: &QuestionDraft, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if self.text != draft.text() {
            self.text = draft.text().to_string();
            changed = true;
        }
        if self.topic.as_deref() != draft.topic() {
            self.topic = draft.topic().map(str::to_string);
            changed = true;
        }
        if self.difficulty != draft.difficulty() {
            self.difficulty = draft.difficulty();
            changed = true;
        }
        if !self.is_active {
            self.is_active = true;
            changed = true;
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Retires the question from circulation, keeping the row for history.
    ///
    /// Returns `true` if the question was active.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.updated_at = now;
        true
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
