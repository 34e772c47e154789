use std::sync::Arc;

use storage::fallback::builtin_questions;
use storage::repository::{QuestionRepository, Storage};
use tracing::{info, warn};

use crate::Clock;
use crate::error::AppServicesError;
use crate::exam::{ExamService, ExamStore};
use crate::question_source::{FallbackPolicy, QuestionSource};

/// Assembles app-facing services over a storage backend.
#[derive(Clone)]
pub struct AppServices {
    exam: Arc<ExamService>,
    seeded_bank: bool,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// With `FallbackPolicy::Static` an unreachable database degrades to
    /// in-memory storage holding the built-in questions.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails under
    /// `FallbackPolicy::Strict`.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: FallbackPolicy,
    ) -> Result<Self, AppServicesError> {
        let storage = match Storage::sqlite(db_url).await {
            Ok(storage) => storage,
            Err(err) if policy == FallbackPolicy::Static => {
                warn!(%err, "database unavailable, continuing in memory");
                Storage::in_memory()
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_storage(storage, clock, policy).await
    }

    /// Build services over an arbitrary storage backend, seeding an empty
    /// question bank with the built-in questions.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if seeding fails under `FallbackPolicy::Strict`.
    pub async fn from_storage(
        storage: Storage,
        clock: Clock,
        policy: FallbackPolicy,
    ) -> Result<Self, AppServicesError> {
        let seeded_bank = match ensure_question_bank(storage.questions.as_ref()).await {
            Ok(seeded) => seeded,
            Err(err) if policy == FallbackPolicy::Static => {
                warn!(%err, "could not seed question bank");
                false
            }
            Err(err) => return Err(err),
        };

        let source = QuestionSource::new(Arc::clone(&storage.questions), policy);
        let store = ExamStore::new(Arc::clone(&storage.values));
        let exam = Arc::new(ExamService::new(clock, source, store));

        Ok(Self { exam, seeded_bank })
    }

    #[must_use]
    pub fn exam(&self) -> Arc<ExamService> {
        Arc::clone(&self.exam)
    }

    /// True when this start-up filled an empty question bank.
    #[must_use]
    pub fn seeded_bank(&self) -> bool {
        self.seeded_bank
    }
}

async fn ensure_question_bank(
    questions: &dyn QuestionRepository,
) -> Result<bool, AppServicesError> {
    if !questions.available_domains().await?.is_empty() {
        return Ok(false);
    }

    let builtin = builtin_questions();
    for question in &builtin {
        questions.upsert_question(question).await?;
    }
    info!(count = builtin.len(), "seeded empty question bank");
    Ok(true)
}
