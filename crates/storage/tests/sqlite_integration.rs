use exam_core::model::{AnswerKind, Question, QuestionDraft, QuestionId};
use storage::fallback::builtin_questions;
use storage::repository::{KeyValueStore, QuestionRepository};
use storage::sqlite::SqliteRepository;

fn build_question(id: u64, domain: &str, kind: AnswerKind, correct: Vec<usize>) -> Question {
    QuestionDraft {
        id: QuestionId::new(id),
        domain: domain.into(),
        prompt: format!("Question {id}"),
        options: vec!["a".into(), "b".into(), "c".into()],
        kind,
        correct,
        sources: vec!["https://kubernetes.io/docs/".into()],
    }
    .validate()
    .unwrap()
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_preserves_question_fields() {
    let repo = connect("memdb_question_roundtrip").await;
    let question = build_question(7, "Platform_Security", AnswerKind::Multiple, vec![2, 0]);
    repo.upsert_question(&question).await.unwrap();

    let fetched = repo.all_questions(&[]).await.unwrap();
    assert_eq!(fetched, vec![question]);
    assert_eq!(fetched[0].correct(), &[0, 2]);
    assert_eq!(fetched[0].kind(), AnswerKind::Multiple);
}

#[tokio::test]
async fn sqlite_filters_by_domain_and_lists_domains() {
    let repo = connect("memdb_domains").await;
    for (id, domain) in [
        (1, "Platform_Security"),
        (2, "Cloud_Native_Security"),
        (3, "Kubernetes_Threat_Model"),
        (4, "Platform_Security"),
    ] {
        repo.upsert_question(&build_question(id, domain, AnswerKind::Single, vec![1]))
            .await
            .unwrap();
    }

    assert_eq!(
        repo.available_domains().await.unwrap(),
        vec![
            "Cloud_Native_Security",
            "Kubernetes_Threat_Model",
            "Platform_Security"
        ]
    );

    let selected = repo
        .all_questions(&[
            "Platform_Security".to_string(),
            "Kubernetes_Threat_Model".to_string(),
        ])
        .await
        .unwrap();
    let ids: Vec<u64> = selected.iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![1, 3, 4]);

    let none = repo
        .all_questions(&["Unknown_Domain".to_string()])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn sqlite_skips_malformed_rows() {
    let repo = connect("memdb_malformed").await;
    repo.upsert_question(&build_question(1, "Platform_Security", AnswerKind::Single, vec![0]))
        .await
        .unwrap();

    sqlx::query(
        r#"
        INSERT INTO questions (id, domain, question, options, question_type, correct_answers, sources)
        VALUES (2, 'Platform_Security', 'Broken options', 'not json', 'single-choice', '[0]', NULL),
               (3, 'Platform_Security', 'Broken answer', '["x","y"]', 'single-choice', '[5]', NULL),
               (4, 'Platform_Security', 'Broken kind', '["x","y"]', 'essay', '[0]', NULL)
        "#,
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let questions = repo.all_questions(&[]).await.unwrap();
    let ids: Vec<u64> = questions.iter().map(|q| q.id().value()).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn sqlite_malformed_sources_read_as_empty() {
    let repo = connect("memdb_sources").await;
    sqlx::query(
        r#"
        INSERT INTO questions (id, domain, question, options, question_type, correct_answers, sources)
        VALUES (9, 'Cloud_Native_Security', 'Sources garbage', '["x","y"]', 'single-choice', '[1]', '{oops')
        "#,
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let questions = repo.all_questions(&[]).await.unwrap();
    assert_eq!(questions.len(), 1);
    assert!(questions[0].sources().is_empty());
}

#[tokio::test]
async fn sqlite_key_value_store_overwrites_and_removes() {
    let repo = connect("memdb_kv").await;
    assert_eq!(repo.get_value("exam.session").await.unwrap(), None);

    repo.set_value("exam.session", "{\"version\":1}").await.unwrap();
    repo.set_value("exam.session", "{\"version\":2}").await.unwrap();
    assert_eq!(
        repo.get_value("exam.session").await.unwrap().as_deref(),
        Some("{\"version\":2}")
    );

    repo.remove_value("exam.session").await.unwrap();
    assert_eq!(repo.get_value("exam.session").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent_and_accept_builtin_bank() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");

    for question in builtin_questions() {
        repo.upsert_question(&question).await.unwrap();
    }
    assert_eq!(repo.available_domains().await.unwrap().len(), 6);
}
