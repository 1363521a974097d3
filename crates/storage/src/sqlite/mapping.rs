use sqlx::Row;
use uuid::Uuid;

use trainer_core::model::{
    Answer, AnswerId, Difficulty, Question, QuestionId, SessionId, SessionStatus, TrainingSession,
    UserId,
};

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn index_from_i64(v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid current_index: {v}")))
}

pub(crate) fn parse_status(s: &str) -> Result<SessionStatus, StorageError> {
    SessionStatus::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid status: {s}")))
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let difficulty_raw: i64 = row.try_get("difficulty").map_err(ser)?;
    Ok(Question::from_persisted(
        QuestionId::from_uuid(row.try_get::<Uuid, _>("id").map_err(ser)?),
        row.try_get("suite").map_err(ser)?,
        row.try_get("code").map_err(ser)?,
        row.try_get("text").map_err(ser)?,
        row.try_get("topic").map_err(ser)?,
        Difficulty::from_i64(difficulty_raw).map_err(ser)?,
        row.try_get("is_active").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    ))
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TrainingSession, StorageError> {
    let status_raw: String = row.try_get("status").map_err(ser)?;
    Ok(TrainingSession::from_persisted(
        SessionId::from_uuid(row.try_get::<Uuid, _>("id").map_err(ser)?),
        UserId::new(row.try_get("user_id").map_err(ser)?),
        row.try_get("suite").map_err(ser)?,
        parse_status(&status_raw)?,
        index_from_i64(row.try_get("current_index").map_err(ser)?)?,
        row.try_get("draft_answer").map_err(ser)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("finished_at").map_err(ser)?,
    ))
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<Answer, StorageError> {
    Ok(Answer::from_persisted(
        AnswerId::from_uuid(row.try_get::<Uuid, _>("id").map_err(ser)?),
        SessionId::from_uuid(row.try_get::<Uuid, _>("session_id").map_err(ser)?),
        row.try_get::<Option<Uuid>, _>("question_id")
            .map_err(ser)?
            .map(QuestionId::from_uuid),
        row.try_get("question_text_snapshot").map_err(ser)?,
        row.try_get("answer_text").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    ))
}
