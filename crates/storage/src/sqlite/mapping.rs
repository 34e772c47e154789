use exam_core::model::{AnswerKind, Question, QuestionDraft, QuestionId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    u64::try_from(v)
        .map(QuestionId::new)
        .map_err(|_| StorageError::Serialization("question_id sign overflow".into()))
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("question_id overflow".into()))
}

pub(crate) fn parse_answer_kind(s: &str) -> Result<AnswerKind, StorageError> {
    AnswerKind::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid question_type: {s}")))
}

/// Decode one `questions` row. `options` and `correct_answers` are JSON arrays;
/// `sources` may be NULL or hold malformed JSON, which reads as no sources.
pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;

    let options_raw: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_raw)
        .map_err(|e| StorageError::Serialization(format!("options of question {id}: {e}")))?;

    let correct_raw: String = row.try_get("correct_answers").map_err(ser)?;
    let correct: Vec<usize> = serde_json::from_str(&correct_raw).map_err(|e| {
        StorageError::Serialization(format!("correct_answers of question {id}: {e}"))
    })?;

    let sources = row
        .try_get::<Option<String>, _>("sources")
        .map_err(ser)?
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    let kind_raw: String = row.try_get("question_type").map_err(ser)?;

    QuestionDraft {
        id,
        domain: row.try_get("domain").map_err(ser)?,
        prompt: row.try_get("question").map_err(ser)?,
        options,
        kind: parse_answer_kind(&kind_raw)?,
        correct,
        sources,
    }
    .validate()
    .map_err(|e| StorageError::Serialization(format!("question {id}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(question_id_from_i64(-1).is_err());
        assert_eq!(question_id_from_i64(12).unwrap(), QuestionId::new(12));
    }

    #[test]
    fn answer_kind_labels_map() {
        assert_eq!(parse_answer_kind("single-choice").unwrap(), AnswerKind::Single);
        assert!(parse_answer_kind("true-false").is_err());
    }
}
