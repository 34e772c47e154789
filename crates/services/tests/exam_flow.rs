use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{ExamPhase, Question, QuestionId};
use exam_core::time::fixed_now;
use services::{
    AppServices, BuildError, Clock, ExamError, ExamEvent, ExamService, ExamStore, FallbackPolicy,
    QuestionSource, SourceError,
};
use services::exam::SESSION_KEY;
use storage::fallback::builtin_bank;
use storage::repository::{
    InMemoryRepository, KeyValueStore, QuestionRepository, Storage, StorageError,
};

async fn services(storage: Storage) -> AppServices {
    AppServices::from_storage(storage, Clock::fixed(fixed_now()), FallbackPolicy::Static)
        .await
        .unwrap()
}

async fn untimed_exam(storage: Storage) -> Arc<ExamService> {
    let exam = services(storage).await.exam();
    exam.update_preferences(|d| d.timer_enabled = false)
        .await
        .unwrap();
    exam
}

#[tokio::test]
async fn full_exam_flow_scores_correct_answers() {
    let exam = untimed_exam(Storage::in_memory()).await;

    let session = exam.start_exam(false).await.unwrap();
    assert_eq!(session.len(), 5);
    assert_eq!(session.remaining_secs(), 300);

    let questions: Vec<Question> = session.questions().to_vec();
    for (index, question) in questions.iter().enumerate() {
        exam.record_answer(question.id(), question.correct().to_vec())
            .await
            .unwrap();
        if index == 1 {
            assert!(exam.toggle_flag(question.id()).await.unwrap());
        }
        let after = exam.next().await.unwrap();
        let expected = if index + 1 < questions.len() {
            ExamPhase::InProgress
        } else {
            ExamPhase::Reviewing
        };
        assert_eq!(after.phase(), expected);
    }

    let reviewing = exam.current().await.unwrap();
    assert_eq!(
        reviewing.current_review_question().map(Question::id),
        Some(questions[1].id())
    );

    let finished = exam.review_next().await.unwrap();
    assert_eq!(finished.phase(), ExamPhase::Finished);

    let report = exam.report().await.unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.correct, 5);
    assert_eq!(report.score_percent, 100);
    assert!(report.passed);
}

#[tokio::test]
async fn starred_only_without_stars_leaves_state_untouched() {
    let exam = untimed_exam(Storage::in_memory()).await;

    let err = exam.start_exam(true).await.unwrap_err();
    assert!(matches!(
        err,
        ExamError::Build(BuildError::NoStarredQuestions)
    ));
    assert_eq!(exam.phase().await, ExamPhase::NotStarted);
    assert!(matches!(exam.next().await, Err(ExamError::NoActiveSession)));
}

#[tokio::test]
async fn starred_only_uses_persistent_stars() {
    let exam = untimed_exam(Storage::in_memory()).await;
    exam.update_preferences(|d| d.question_count = 50)
        .await
        .unwrap();
    for id in [1, 4, 7] {
        assert!(exam.toggle_star(QuestionId::new(id)).await.unwrap());
    }

    let session = exam.start_exam(true).await.unwrap();
    assert_eq!(session.len(), 3);
    let mut ids: Vec<u64> = session.questions().iter().map(|q| q.id().value()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4, 7]);
}

#[tokio::test]
async fn session_resumes_after_restart_of_services() {
    let storage = Storage::in_memory();
    let exam = untimed_exam(storage.clone()).await;
    let started = exam.start_exam(false).await.unwrap();
    let first = started.questions()[0].clone();
    exam.record_answer(first.id(), first.correct().to_vec())
        .await
        .unwrap();
    exam.toggle_flag(first.id()).await.unwrap();
    exam.jump_to(3).await.unwrap();

    let reopened = services(storage).await.exam();
    let resumed = reopened.resume().await.unwrap().unwrap();
    assert_eq!(resumed.phase(), ExamPhase::InProgress);
    assert_eq!(resumed.position(), 3);
    assert_eq!(resumed.answer_for(first.id()), Some(first.correct()));
    assert!(resumed.is_flagged(first.id()));
}

#[tokio::test(start_paused = true)]
async fn resumed_exam_keeps_counting_down_from_saved_time() {
    let storage = Storage::in_memory();
    let exam = services(storage.clone()).await.exam();
    exam.start_exam(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(exam.current().await.unwrap().remaining_secs(), 297);
    drop(exam);

    let reopened = services(storage).await.exam();
    let mut events = reopened.subscribe();
    let resumed = reopened.resume().await.unwrap().unwrap();
    assert_eq!(resumed.phase(), ExamPhase::InProgress);
    assert_eq!(resumed.remaining_secs(), 297);

    assert_eq!(
        events.recv().await.unwrap(),
        ExamEvent::Tick { remaining_secs: 296 }
    );
    assert_eq!(reopened.current().await.unwrap().remaining_secs(), 296);
}

#[tokio::test]
async fn restart_discards_session_everywhere() {
    let storage = Storage::in_memory();
    let exam = untimed_exam(storage.clone()).await;
    exam.start_exam(false).await.unwrap();
    exam.restart().await.unwrap();

    assert_eq!(exam.phase().await, ExamPhase::NotStarted);
    assert!(ExamStore::new(Arc::clone(&storage.values))
        .load_session()
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_moves_exam_to_review_once() {
    let exam = services(Storage::in_memory()).await.exam();
    exam.update_preferences(|d| d.question_count = 2)
        .await
        .unwrap();
    let mut events = exam.subscribe();

    let session = exam.start_exam(false).await.unwrap();
    exam.toggle_flag(session.questions()[0].id()).await.unwrap();

    let mut expired = 0;
    let mut ticks = 0;
    while expired == 0 {
        match events.recv().await.unwrap() {
            ExamEvent::Tick { .. } => ticks += 1,
            ExamEvent::Expired { phase } => {
                assert_eq!(phase, ExamPhase::Reviewing);
                expired += 1;
            }
        }
    }
    assert_eq!(ticks, 119);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(exam.phase().await, ExamPhase::Reviewing);

    exam.finish_review().await.unwrap();
    let report = exam.report().await.unwrap();
    assert_eq!(report.answered, 0);
    assert!(!report.passed);
}

#[tokio::test(start_paused = true)]
async fn finishing_early_stops_the_timer() {
    let exam = services(Storage::in_memory()).await.exam();
    let mut events = exam.subscribe();
    exam.start_exam(false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let finished = exam.finish().await.unwrap();
    assert_eq!(finished.phase(), ExamPhase::Finished);
    let remaining = finished.remaining_secs();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(exam.current().await.unwrap().remaining_secs(), remaining);
    assert_eq!(events.recv().await.unwrap(), ExamEvent::Tick { remaining_secs: 299 });
    assert!(events.try_recv().is_err());
}

#[derive(Default)]
struct FlakyValues {
    inner: InMemoryRepository,
    fail_session_writes: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyValues {
    async fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_value(key).await
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == SESSION_KEY && self.fail_session_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("disk full".into()));
        }
        self.inner.set_value(key, value).await
    }

    async fn remove_value(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_value(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn unsaved_new_exam_keeps_running_one_and_its_timer() {
    let values = Arc::new(FlakyValues::default());
    let source = QuestionSource::new(Arc::new(builtin_bank()), FallbackPolicy::Static);
    let exam = ExamService::new(
        Clock::fixed(fixed_now()),
        source,
        ExamStore::new(values.clone()),
    )
    .with_seed(3);
    let started = exam.start_exam(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    values.fail_session_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        exam.start_exam(false).await,
        Err(ExamError::Storage(StorageError::Connection(_)))
    ));
    assert_eq!(
        exam.current().await.unwrap().questions(),
        started.questions()
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(exam.current().await.unwrap().remaining_secs(), 297);
}

struct OfflineBank;

#[async_trait]
impl QuestionRepository for OfflineBank {
    async fn upsert_question(&self, _question: &Question) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn available_domains(&self) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn all_questions(&self, _domains: &[String]) -> Result<Vec<Question>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

fn offline_exam(policy: FallbackPolicy) -> ExamService {
    let source = QuestionSource::new(Arc::new(OfflineBank), policy);
    let store = ExamStore::new(Arc::new(InMemoryRepository::new()));
    ExamService::new(Clock::fixed(fixed_now()), source, store).with_seed(9)
}

#[tokio::test]
async fn offline_bank_falls_back_to_builtin_questions() {
    let exam = offline_exam(FallbackPolicy::Static);
    exam.update_preferences(|d| d.timer_enabled = false)
        .await
        .unwrap();
    let session = exam.start_exam(false).await.unwrap();
    assert_eq!(session.len(), 5);
}

#[tokio::test]
async fn strict_policy_reports_offline_bank() {
    let exam = offline_exam(FallbackPolicy::Strict);
    let err = exam.start_exam(false).await.unwrap_err();
    assert!(matches!(err, ExamError::Source(SourceError::Unavailable(_))));
    assert_eq!(exam.phase().await, ExamPhase::NotStarted);
}

#[tokio::test]
async fn sqlite_backed_services_persist_between_instances() {
    let url = "sqlite:file:memdb_exam_services?mode=memory&cache=shared";
    let first = AppServices::new_sqlite(url, Clock::fixed(fixed_now()), FallbackPolicy::Strict)
        .await
        .unwrap();
    assert!(first.seeded_bank());
    let exam = first.exam();
    exam.update_preferences(|d| {
        d.timer_enabled = false;
        d.question_count = 3;
    })
    .await
    .unwrap();
    let started = exam.start_exam(false).await.unwrap();

    let second = AppServices::new_sqlite(url, Clock::fixed(fixed_now()), FallbackPolicy::Strict)
        .await
        .unwrap();
    assert!(!second.seeded_bank());
    let resumed = second.exam().resume().await.unwrap().unwrap();
    assert_eq!(resumed, started);
}
