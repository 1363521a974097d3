use chrono::{DateTime, Utc};

use trainer_core::model::{Answer, SessionId, SessionStatus, TrainingSession};

use super::{
    SqliteRepository,
    mapping::{map_answer_row, map_session_row},
};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session_replacing_active(
        &self,
        session: &TrainingSession,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let canceled = sqlx::query(
            r"
            UPDATE training_sessions
            SET status = ?3, finished_at = ?2, draft_answer = NULL
            WHERE user_id = ?1 AND status = ?4
            ",
        )
        .bind(session.user_id().value())
        .bind(now)
        .bind(SessionStatus::Canceled.as_str())
        .bind(SessionStatus::InProgress.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .rows_affected();

        sqlx::query(
            r"
            INSERT INTO training_sessions (
                id, user_id, suite, status, current_index, draft_answer,
                started_at, finished_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(session.id().value())
        .bind(session.user_id().value())
        .bind(session.suite())
        .bind(session.status().as_str())
        .bind(i64::from(session.current_index()))
        .bind(session.draft_answer())
        .bind(session.started_at())
        .bind(session.finished_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(canceled)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<TrainingSession>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, suite, status, current_index, draft_answer,
                   started_at, finished_at
            FROM training_sessions
            WHERE id = ?1
            ",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| map_session_row(&r)).transpose()
    }

    async fn append_draft(&self, id: SessionId, part: &str) -> Result<bool, StorageError> {
        // The concatenation runs inside the store so concurrent transport
        // deliveries serialize on the row instead of racing a
        // read-modify-write in the engine.
        let result = sqlx::query(
            r"
            UPDATE training_sessions
            SET draft_answer = CASE
                    WHEN draft_answer IS NULL OR draft_answer = '' THEN ?2
                    ELSE draft_answer || char(10) || ?2
                END
            WHERE id = ?1 AND status = ?3
            ",
        )
        .bind(id.value())
        .bind(part)
        .bind(SessionStatus::InProgress.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit_transition(
        &self,
        session: &TrainingSession,
        observed_index: u32,
        answer: Option<&Answer>,
    ) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let updated = sqlx::query(
            r"
            UPDATE training_sessions
            SET status = ?2, current_index = ?3, draft_answer = ?4, finished_at = ?5
            WHERE id = ?1 AND status = ?6 AND current_index = ?7
            ",
        )
        .bind(session.id().value())
        .bind(session.status().as_str())
        .bind(i64::from(session.current_index()))
        .bind(session.draft_answer())
        .bind(session.finished_at())
        .bind(SessionStatus::InProgress.as_str())
        .bind(i64::from(observed_index))
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .rows_affected();

        if updated == 0 {
            // Guard failed: the row moved on under us. Dropping the
            // transaction rolls back.
            return Err(StorageError::Conflict);
        }

        if let Some(answer) = answer {
            sqlx::query(
                r"
                INSERT INTO answers (
                    id, session_id, question_id, question_text_snapshot,
                    answer_text, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(answer.id().value())
            .bind(answer.session_id().value())
            .bind(answer.question_id().map(|q| q.value()))
            .bind(answer.question_text_snapshot())
            .bind(answer.answer_text())
            .bind(answer.created_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn answers_for_session(&self, id: SessionId) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, session_id, question_id, question_text_snapshot,
                   answer_text, created_at
            FROM answers
            WHERE session_id = ?1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut answers = Vec::with_capacity(rows.len());
        for row in rows {
            answers.push(map_answer_row(&row)?);
        }
        Ok(answers)
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM training_sessions WHERE id = ?1")
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
