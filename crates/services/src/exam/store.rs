use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use exam_core::model::{
    ExamPhase, ExamSession, ExamSessionParts, Preferences, Question, QuestionId,
};
use storage::repository::{KeyValueStore, StorageError};
use tracing::warn;

pub const SESSION_KEY: &str = "exam.session";
pub const PREFERENCES_KEY: &str = "exam.preferences";

const SNAPSHOT_VERSION: u32 = 1;
const PREFERENCES_VERSION: u32 = 1;

//
// ─── PERSISTED SHAPES ──────────────────────────────────────────────────────────
//

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnswerEntry {
    question_id: QuestionId,
    selected: Vec<usize>,
}

/// JSON form of an in-flight or finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExamSnapshot {
    phase: ExamPhase,
    questions: Vec<Question>,
    #[serde(default)]
    answers: Vec<AnswerEntry>,
    #[serde(default)]
    flagged: Vec<QuestionId>,
    #[serde(default)]
    position: usize,
    #[serde(default)]
    review_position: usize,
    remaining_secs: u32,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl From<ExamSessionParts> for ExamSnapshot {
    fn from(parts: ExamSessionParts) -> Self {
        Self {
            phase: parts.phase,
            questions: parts.questions,
            answers: parts
                .answers
                .into_iter()
                .map(|(question_id, selected)| AnswerEntry {
                    question_id,
                    selected,
                })
                .collect(),
            flagged: parts.flagged.into_iter().collect(),
            position: parts.position,
            review_position: parts.review_position,
            remaining_secs: parts.remaining_secs,
            started_at: parts.started_at,
            finished_at: parts.finished_at,
        }
    }
}

impl From<ExamSnapshot> for ExamSessionParts {
    fn from(snapshot: ExamSnapshot) -> Self {
        Self {
            phase: snapshot.phase,
            questions: snapshot.questions,
            answers: snapshot
                .answers
                .into_iter()
                .map(|entry| (entry.question_id, entry.selected))
                .collect(),
            flagged: snapshot.flagged.into_iter().collect(),
            position: snapshot.position,
            review_position: snapshot.review_position,
            remaining_secs: snapshot.remaining_secs,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
        }
    }
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

/// Typed access to the exam's key-value records.
///
/// Each record is written as one JSON value `{"version": n, "data": ...}`.
/// Values that fail to parse, carry another version or violate session
/// invariants read as absent.
#[derive(Clone)]
pub struct ExamStore {
    values: Arc<dyn KeyValueStore>,
}

impl ExamStore {
    #[must_use]
    pub fn new(values: Arc<dyn KeyValueStore>) -> Self {
        Self { values }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub async fn load_session(&self) -> Result<Option<ExamSession>, StorageError> {
        let Some(snapshot) = self
            .read::<ExamSnapshot>(SESSION_KEY, SNAPSHOT_VERSION)
            .await?
        else {
            return Ok(None);
        };
        match ExamSession::from_parts(snapshot.into()) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(key = SESSION_KEY, %err, "discarding inconsistent session snapshot");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    pub async fn save_session(&self, session: &ExamSession) -> Result<(), StorageError> {
        let snapshot = ExamSnapshot::from(session.to_parts());
        self.write(SESSION_KEY, SNAPSHOT_VERSION, &snapshot).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    pub async fn clear_session(&self) -> Result<(), StorageError> {
        self.values.remove_value(SESSION_KEY).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    pub async fn load_preferences(&self) -> Result<Option<Preferences>, StorageError> {
        self.read(PREFERENCES_KEY, PREFERENCES_VERSION).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the preferences cannot be written.
    pub async fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        self.write(PREFERENCES_KEY, PREFERENCES_VERSION, preferences)
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    pub async fn clear_preferences(&self) -> Result<(), StorageError> {
        self.values.remove_value(PREFERENCES_KEY).await
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: &str,
        version: u32,
    ) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.values.get_value(key).await? else {
            return Ok(None);
        };
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key, %err, "ignoring malformed stored value");
                return Ok(None);
            }
        };
        if envelope.version != version {
            warn!(key, found = envelope.version, expected = version, "ignoring stored value with unknown version");
            return Ok(None);
        }
        match serde_json::from_value(envelope.data) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, %err, "ignoring malformed stored value");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        version: u32,
        data: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&EnvelopeRef { version, data })
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.values.set_value(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AnswerKind, QuestionDraft};
    use exam_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn build_question(id: u64) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            domain: "Platform_Security".into(),
            prompt: format!("Q{id}"),
            options: vec!["a".into(), "b".into(), "c".into()],
            kind: AnswerKind::Multiple,
            correct: vec![0, 2],
            sources: Vec::new(),
        }
        .validate()
        .unwrap()
    }

    fn store() -> (ExamStore, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        (ExamStore::new(Arc::new(repo.clone())), repo)
    }

    #[tokio::test]
    async fn session_snapshot_round_trips() {
        let (store, _) = store();
        let mut session =
            ExamSession::start(vec![build_question(1), build_question(2)], fixed_now()).unwrap();
        session.record_answer(QuestionId::new(2), vec![2, 0]).unwrap();
        session.toggle_flag(QuestionId::new(1)).unwrap();
        session.next(fixed_now()).unwrap();
        session.tick(fixed_now());

        store.save_session(&session).await.unwrap();
        let loaded = store.load_session().await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.remaining_secs(), 119);
        assert_eq!(loaded.answer_for(QuestionId::new(2)), Some(&[0, 2][..]));

        store.clear_session().await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_values_read_as_absent() {
        let (store, repo) = store();
        repo.set_value(SESSION_KEY, "not json").await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());

        repo.set_value(PREFERENCES_KEY, r#"{"version":99,"data":{}}"#)
            .await
            .unwrap();
        assert!(store.load_preferences().await.unwrap().is_none());

        repo.set_value(PREFERENCES_KEY, r#"{"version":1,"data":{"question_count":0}}"#)
            .await
            .unwrap();
        assert!(store.load_preferences().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inconsistent_snapshot_reads_as_absent() {
        let (store, repo) = store();
        let question = serde_json::to_value(build_question(1)).unwrap();
        let raw = serde_json::json!({
            "version": 1,
            "data": {
                "phase": "in_progress",
                "questions": [question],
                "answers": [{"question_id": 7, "selected": [0]}],
                "remaining_secs": 60,
                "started_at": "2023-11-14T22:13:20Z"
            }
        });
        repo.set_value(SESSION_KEY, &raw.to_string()).await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let (store, _) = store();
        assert!(store.load_preferences().await.unwrap().is_none());

        let mut prefs = Preferences::default();
        prefs.toggle_star(QuestionId::new(3));
        prefs.select_domains(vec!["Platform_Security".to_string()]);
        store.save_preferences(&prefs).await.unwrap();

        assert_eq!(store.load_preferences().await.unwrap(), Some(prefs));
    }
}
