use async_trait::async_trait;
use exam_core::model::Question;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::warn;

use super::SqliteRepository;
use super::mapping::{map_question_row, question_id_to_i64};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options = serde_json::to_string(question.options())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let correct = serde_json::to_string(question.correct())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let sources = if question.sources().is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(question.sources())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            )
        };

        sqlx::query(
            r"
            INSERT INTO questions (id, domain, question, options, question_type, correct_answers, sources)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                domain = excluded.domain,
                question = excluded.question,
                options = excluded.options,
                question_type = excluded.question_type,
                correct_answers = excluded.correct_answers,
                sources = excluded.sources
            ",
        )
        .bind(question_id_to_i64(question.id())?)
        .bind(question.domain())
        .bind(question.prompt())
        .bind(options)
        .bind(question.kind().as_str())
        .bind(correct)
        .bind(sources)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn available_domains(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT DISTINCT domain FROM questions ORDER BY domain")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("domain")
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn all_questions(&self, domains: &[String]) -> Result<Vec<Question>, StorageError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, domain, question, options, question_type, correct_answers, sources FROM questions",
        );
        if !domains.is_empty() {
            builder.push(" WHERE domain IN (");
            let mut separated = builder.separated(", ");
            for domain in domains {
                separated.push_bind(domain.as_str());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY id ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in &rows {
            match map_question_row(row) {
                Ok(question) => questions.push(question),
                // Malformed rows read as absent.
                Err(err) => warn!(%err, "skipping malformed question row"),
            }
        }
        Ok(questions)
    }
}
