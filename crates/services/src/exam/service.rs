use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use exam_core::model::{
    ExamPhase, ExamReport, ExamSession, Preferences, PreferencesDraft, QuestionId,
    SessionStateError,
};

use super::countdown::{Countdown, ExamEvent};
use super::plan::SessionBuilder;
use super::store::ExamStore;
use crate::Clock;
use crate::error::ExamError;
use crate::preferences_service::PreferencesService;
use crate::question_source::QuestionSource;

const EVENT_CAPACITY: usize = 64;

/// Drives exam sessions: builds them from the question source, applies user
/// actions, runs the countdown and persists every change.
///
/// Every mutation updates the in-memory session first, then writes it to the
/// key-value store.
pub struct ExamService {
    clock: Clock,
    source: QuestionSource,
    store: ExamStore,
    preferences: PreferencesService,
    session: Arc<Mutex<Option<ExamSession>>>,
    countdown: std::sync::Mutex<Option<Countdown>>,
    events: broadcast::Sender<ExamEvent>,
    rng: std::sync::Mutex<StdRng>,
}

impl ExamService {
    #[must_use]
    pub fn new(clock: Clock, source: QuestionSource, store: ExamStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clock,
            source,
            preferences: PreferencesService::new(store.clone()),
            store,
            session: Arc::new(Mutex::new(None)),
            countdown: std::sync::Mutex::new(None),
            events,
            rng: std::sync::Mutex::new(StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Use a seeded generator so question order is reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = std::sync::Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExamEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn preferences_service(&self) -> &PreferencesService {
        &self.preferences
    }

    //
    // ─── PREFERENCES ───────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `ExamError::Source` if the question bank cannot be read.
    pub async fn available_domains(&self) -> Result<Vec<String>, ExamError> {
        Ok(self.source.available_domains().await?)
    }

    /// Current preferences, with an empty domain selection filled with every
    /// available domain.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the question bank or the store cannot be read.
    pub async fn preferences(&self) -> Result<Preferences, ExamError> {
        let available = self.available_domains().await?;
        Ok(self.preferences.load_with_domains(available).await?)
    }

    /// # Errors
    ///
    /// Returns `ExamError::Preferences` if the edit is invalid or cannot be saved.
    pub async fn update_preferences(
        &self,
        f: impl FnOnce(&mut PreferencesDraft),
    ) -> Result<Preferences, ExamError> {
        Ok(self.preferences.update(f).await?)
    }

    /// Flip the persistent star on `id`, whatever the session phase.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Preferences` if the preferences cannot be saved.
    pub async fn toggle_star(&self, id: QuestionId) -> Result<bool, ExamError> {
        Ok(self.preferences.toggle_star(id).await?)
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Build a new session from the selected domains and start it, replacing
    /// any previous one.
    ///
    /// Nothing changes when the build or the save fails.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NoDomainsSelected` without a domain selection and
    /// `ExamError::Build` when the pool yields no session.
    pub async fn start_exam(&self, starred_only: bool) -> Result<ExamSession, ExamError> {
        let preferences = self.preferences().await?;
        if preferences.selected_domains().is_empty() {
            return Err(ExamError::NoDomainsSelected);
        }
        let pool = self
            .source
            .all_questions(preferences.selected_domains())
            .await?;

        let mut builder = SessionBuilder::new(preferences.question_count());
        if starred_only {
            builder = builder.starred_only(preferences.starred());
        }
        let session = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            builder.build(pool, &mut *rng, self.clock.now())?
        };

        let mut guard = self.session.lock().await;
        self.store.save_session(&session).await?;
        self.stop_countdown();
        *guard = Some(session.clone());
        drop(guard);

        info!(
            questions = session.len(),
            starred_only,
            timer = preferences.timer_enabled(),
            "exam started"
        );
        if preferences.timer_enabled() {
            self.start_countdown();
        }
        Ok(session)
    }

    /// Reload a persisted session, restarting the countdown if it is still in
    /// progress.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the store or preferences cannot be read.
    pub async fn resume(&self) -> Result<Option<ExamSession>, ExamError> {
        let Some(session) = self.store.load_session().await? else {
            return Ok(None);
        };
        let timer_enabled = self.preferences.load().await?.timer_enabled();

        let mut guard = self.session.lock().await;
        self.stop_countdown();
        *guard = Some(session.clone());
        drop(guard);

        info!(phase = %session.phase(), remaining_secs = session.remaining_secs(), "exam resumed");
        if timer_enabled && session.phase() == ExamPhase::InProgress {
            self.start_countdown();
        }
        Ok(Some(session))
    }

    /// Discard the current session from memory and storage.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Storage` if the snapshot cannot be removed.
    pub async fn restart(&self) -> Result<(), ExamError> {
        let mut guard = self.session.lock().await;
        self.stop_countdown();
        *guard = None;
        self.store.clear_session().await?;
        info!("exam restarted");
        Ok(())
    }

    /// Snapshot of the current session, if any.
    pub async fn current(&self) -> Option<ExamSession> {
        self.session.lock().await.clone()
    }

    /// [`ExamPhase::NotStarted`] when no session exists.
    pub async fn phase(&self) -> ExamPhase {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(ExamPhase::NotStarted, ExamSession::phase)
    }

    //
    // ─── SESSION ACTIONS ───────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `ExamError` if no session is active or the answer is invalid.
    pub async fn record_answer(
        &self,
        id: QuestionId,
        selected: Vec<usize>,
    ) -> Result<ExamSession, ExamError> {
        self.mutate(|session, _| session.record_answer(id, selected))
            .await
            .map(|((), session)| session)
    }

    /// # Errors
    ///
    /// Returns `ExamError` if no session is active or `id` is not part of it.
    pub async fn toggle_flag(&self, id: QuestionId) -> Result<bool, ExamError> {
        self.mutate(|session, _| session.toggle_flag(id))
            .await
            .map(|(flagged, _)| flagged)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless an exam is in progress.
    pub async fn next(&self) -> Result<ExamSession, ExamError> {
        self.mutate(ExamSession::next).await.map(|(_, s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless an exam is in progress.
    pub async fn previous(&self) -> Result<ExamSession, ExamError> {
        self.mutate(|session, _| session.previous())
            .await
            .map(|((), s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless an exam is in progress and `index` exists.
    pub async fn jump_to(&self, index: usize) -> Result<ExamSession, ExamError> {
        self.mutate(|session, _| session.jump_to(index))
            .await
            .map(|((), s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless an exam is in progress.
    pub async fn finish(&self) -> Result<ExamSession, ExamError> {
        self.mutate(ExamSession::finish).await.map(|(_, s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless the exam is in review.
    pub async fn review_next(&self) -> Result<ExamSession, ExamError> {
        self.mutate(ExamSession::review_next).await.map(|(_, s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless the exam is in review.
    pub async fn review_previous(&self) -> Result<ExamSession, ExamError> {
        self.mutate(|session, _| session.review_previous())
            .await
            .map(|((), s)| s)
    }

    /// # Errors
    ///
    /// Returns `ExamError` unless the exam is in review.
    pub async fn finish_review(&self) -> Result<ExamSession, ExamError> {
        self.mutate(ExamSession::finish_review)
            .await
            .map(|((), s)| s)
    }

    /// Score the finished exam against the configured pass mark.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` unless the exam is finished.
    pub async fn report(&self) -> Result<ExamReport, ExamError> {
        let pass_mark = self.preferences.load().await?.pass_mark_percent();
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(ExamError::NoActiveSession)?;
        Ok(session.report(pass_mark)?)
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ExamSession, DateTime<Utc>) -> Result<T, SessionStateError>,
    ) -> Result<(T, ExamSession), ExamError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(ExamError::NoActiveSession)?;
        let before = session.phase();
        let value = f(session, self.clock.now())?;
        let after = session.phase();

        if after != ExamPhase::InProgress {
            self.stop_countdown();
        }
        self.store.save_session(session).await?;
        if before != after {
            debug!(from = %before, to = %after, "exam phase changed");
        }
        Ok((value, session.clone()))
    }

    fn start_countdown(&self) {
        let countdown = Countdown::spawn(
            Arc::clone(&self.session),
            self.store.clone(),
            self.clock,
            self.events.clone(),
        );
        let mut slot = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(countdown);
    }

    fn stop_countdown(&self) {
        let mut slot = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(countdown) = slot.take() {
            countdown.stop();
        }
    }
}
