use trainer_core::CatalogDiff;
use trainer_core::model::Question;

use super::{SqliteRepository, mapping::map_question_row};
use crate::repository::{QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str =
    "id, suite, code, text, topic, difficulty, is_active, updated_at";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn questions_for_suite(&self, suite: &str) -> Result<Vec<Question>, StorageError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE suite = ?1");
        let rows = sqlx::query(&sql)
            .bind(suite)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn active_questions(&self, suite: &str) -> Result<Vec<Question>, StorageError> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions \
             WHERE suite = ?1 AND is_active = 1 \
             ORDER BY code ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(suite)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn count_active(&self, suite: &str) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM questions WHERE suite = ?1 AND is_active = 1",
        )
        .bind(suite)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        u64::try_from(count)
            .map_err(|_| StorageError::Serialization(format!("invalid count: {count}")))
    }

    async fn apply_catalog_diff(&self, diff: &CatalogDiff) -> Result<(), StorageError> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for q in &diff.created {
            sqlx::query(
                r"
                INSERT INTO questions (
                    id, suite, code, text, topic, difficulty, is_active, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(q.id().value())
            .bind(q.suite())
            .bind(q.code())
            .bind(q.text())
            .bind(q.topic())
            .bind(q.difficulty().as_i64())
            .bind(q.is_active())
            .bind(q.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        // Updated and deactivated rows keep their identity; only mutable
        // fields change.
        for q in diff.updated.iter().chain(diff.deactivated.iter()) {
            sqlx::query(
                r"
                UPDATE questions
                SET text = ?2, topic = ?3, difficulty = ?4, is_active = ?5, updated_at = ?6
                WHERE id = ?1
                ",
            )
            .bind(q.id().value())
            .bind(q.text())
            .bind(q.topic())
            .bind(q.difficulty().as_i64())
            .bind(q.is_active())
            .bind(q.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
