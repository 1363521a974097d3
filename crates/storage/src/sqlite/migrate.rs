use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (questions, training sessions, answer snapshots,
/// and indexes).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id BLOB PRIMARY KEY,
                    suite TEXT NOT NULL,
                    code TEXT NOT NULL,
                    text TEXT NOT NULL,
                    topic TEXT,
                    difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 3),
                    is_active BOOLEAN NOT NULL DEFAULT 1,
                    updated_at TEXT NOT NULL,
                    UNIQUE (suite, code)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS training_sessions (
                    id BLOB PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    suite TEXT NOT NULL,
                    status TEXT NOT NULL,
                    current_index INTEGER NOT NULL CHECK (current_index >= 0),
                    draft_answer TEXT,
                    started_at TEXT NOT NULL,
                    finished_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answers (
                    id BLOB PRIMARY KEY,
                    session_id BLOB NOT NULL
                        REFERENCES training_sessions(id) ON DELETE CASCADE,
                    question_id BLOB
                        REFERENCES questions(id) ON DELETE SET NULL,
                    question_text_snapshot TEXT NOT NULL,
                    answer_text TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_suite_active_code
                    ON questions (suite, is_active, code);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_status
                    ON training_sessions (user_id, status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_answers_session
                    ON answers (session_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
