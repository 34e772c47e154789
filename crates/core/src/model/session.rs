use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

use crate::model::report::ExamReport;
use crate::model::{AnswerKind, Question, QuestionId};

/// Countdown budget granted for every question in a session.
pub const SECONDS_PER_QUESTION: u32 = 60;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an exam attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamPhase {
    NotStarted,
    InProgress,
    Reviewing,
    Finished,
}

impl ExamPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamPhase::NotStarted => "not started",
            ExamPhase::InProgress => "in progress",
            ExamPhase::Reviewing => "reviewing",
            ExamPhase::Finished => "finished",
        }
    }
}

impl fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("an exam session needs at least one question")]
    Empty,

    #[error("too many questions for a timed session: {len}")]
    TooManyQuestions { len: usize },

    #[error("question {0} appears twice in the session")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("option {index} does not exist on question {id}")]
    OptionOutOfRange { id: QuestionId, index: usize },

    #[error("question {id} accepts a single option, got {count}")]
    TooManySelections { id: QuestionId, count: usize },

    #[error("position {index} is out of range for {len} questions")]
    PositionOutOfRange { index: usize, len: usize },

    #[error("operation not allowed while the exam is {phase}")]
    InvalidPhase { phase: ExamPhase },
}

/// Result of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still in progress with this many seconds left.
    Running { remaining_secs: u32 },
    /// The countdown hit zero on this tick; the session moved to `phase`.
    Expired { phase: ExamPhase },
    /// The session is not in progress; nothing changed.
    Inactive,
}

//
// ─── PERSISTED PARTS ───────────────────────────────────────────────────────────
//

/// Flat view of a session used to persist and rehydrate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSessionParts {
    pub phase: ExamPhase,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<QuestionId, Vec<usize>>,
    pub flagged: BTreeSet<QuestionId>,
    pub position: usize,
    pub review_position: usize,
    pub remaining_secs: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One timed attempt: a fixed question order plus mutable answer/flag state.
///
/// A session is never empty. Every id in `answers` and `flagged` belongs to
/// `questions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSession {
    phase: ExamPhase,
    questions: Vec<Question>,
    answers: BTreeMap<QuestionId, Vec<usize>>,
    flagged: BTreeSet<QuestionId>,
    position: usize,
    review_position: usize,
    remaining_secs: u32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExamSession {
    /// Start a session over `questions` in the given order.
    ///
    /// The countdown is `questions.len() * SECONDS_PER_QUESTION`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` for an empty list and
    /// `SessionStateError::DuplicateQuestion` if an id repeats.
    pub fn start(
        questions: Vec<Question>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        check_questions(&questions)?;
        let remaining_secs = u32::try_from(questions.len())
            .ok()
            .and_then(|n| n.checked_mul(SECONDS_PER_QUESTION))
            .ok_or(SessionStateError::TooManyQuestions {
                len: questions.len(),
            })?;

        Ok(Self {
            phase: ExamPhase::InProgress,
            questions,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            position: 0,
            review_position: 0,
            remaining_secs,
            started_at,
            finished_at: None,
        })
    }

    /// Rehydrate a session from persisted parts, re-checking every invariant.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the parts describe an impossible session.
    pub fn from_parts(parts: ExamSessionParts) -> Result<Self, SessionStateError> {
        check_questions(&parts.questions)?;
        if parts.phase == ExamPhase::NotStarted {
            return Err(SessionStateError::InvalidPhase { phase: parts.phase });
        }
        if parts.position >= parts.questions.len() {
            return Err(SessionStateError::PositionOutOfRange {
                index: parts.position,
                len: parts.questions.len(),
            });
        }

        let mut session = Self {
            phase: parts.phase,
            questions: parts.questions,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            position: parts.position,
            review_position: 0,
            remaining_secs: parts.remaining_secs,
            started_at: parts.started_at,
            finished_at: parts.finished_at,
        };

        for (id, selected) in parts.answers {
            let normalized = normalize_selection(session.question(id)?, selected)?;
            if !normalized.is_empty() {
                session.answers.insert(id, normalized);
            }
        }
        for id in parts.flagged {
            session.question(id)?;
            session.flagged.insert(id);
        }
        session.review_position = parts
            .review_position
            .min(session.flagged.len().saturating_sub(1));

        Ok(session)
    }

    #[must_use]
    pub fn to_parts(&self) -> ExamSessionParts {
        ExamSessionParts {
            phase: self.phase,
            questions: self.questions.clone(),
            answers: self.answers.clone(),
            flagged: self.flagged.clone(),
            position: self.position,
            review_position: self.review_position,
            remaining_secs: self.remaining_secs,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    #[must_use]
    pub fn phase(&self) -> ExamPhase {
        self.phase
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.position]
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Vec<usize>> {
        &self.answers
    }

    #[must_use]
    pub fn answer_for(&self, id: QuestionId) -> Option<&[usize]> {
        self.answers.get(&id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn flagged(&self) -> &BTreeSet<QuestionId> {
        &self.flagged
    }

    #[must_use]
    pub fn is_flagged(&self, id: QuestionId) -> bool {
        self.flagged.contains(&id)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Flagged questions in session order.
    #[must_use]
    pub fn review_queue(&self) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| self.flagged.contains(&q.id()))
            .collect()
    }

    #[must_use]
    pub fn review_position(&self) -> usize {
        self.review_position
    }

    /// The flagged question under the review cursor, if reviewing.
    #[must_use]
    pub fn current_review_question(&self) -> Option<&Question> {
        if self.phase != ExamPhase::Reviewing {
            return None;
        }
        self.review_queue().get(self.review_position).copied()
    }

    /// Overwrite the answer for `id`. An empty selection clears it.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` outside `InProgress`/`Reviewing`, for ids not
    /// in the session, out-of-range options, or several options on a
    /// single-choice question.
    pub fn record_answer(
        &mut self,
        id: QuestionId,
        selected: Vec<usize>,
    ) -> Result<(), SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress, ExamPhase::Reviewing])?;
        let normalized = normalize_selection(self.question(id)?, selected)?;
        if normalized.is_empty() {
            self.answers.remove(&id);
        } else {
            self.answers.insert(id, normalized);
        }
        Ok(())
    }

    /// Flip the flag on `id`; returns whether it is flagged afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` outside `InProgress`/`Reviewing` or for ids
    /// not in the session.
    pub fn toggle_flag(&mut self, id: QuestionId) -> Result<bool, SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress, ExamPhase::Reviewing])?;
        self.question(id)?;
        if self.flagged.remove(&id) {
            self.review_position = self
                .review_position
                .min(self.flagged.len().saturating_sub(1));
            Ok(false)
        } else {
            self.flagged.insert(id);
            Ok(true)
        }
    }

    /// Advance to the next question; past the last one the exam moves to review.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless in progress.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<ExamPhase, SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress])?;
        if self.position + 1 < self.questions.len() {
            self.position += 1;
        } else {
            self.enter_review(now);
        }
        Ok(self.phase)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless in progress.
    pub fn previous(&mut self) -> Result<(), SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress])?;
        self.position = self.position.saturating_sub(1);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` unless in progress or if `index` is out of range.
    pub fn jump_to(&mut self, index: usize) -> Result<(), SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress])?;
        if index >= self.questions.len() {
            return Err(SessionStateError::PositionOutOfRange {
                index,
                len: self.questions.len(),
            });
        }
        self.position = index;
        Ok(())
    }

    /// Stop answering and move to review (or straight to finished when nothing
    /// is flagged).
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless in progress.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<ExamPhase, SessionStateError> {
        self.ensure_phase(&[ExamPhase::InProgress])?;
        self.enter_review(now);
        Ok(self.phase)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless reviewing.
    pub fn review_next(&mut self, now: DateTime<Utc>) -> Result<ExamPhase, SessionStateError> {
        self.ensure_phase(&[ExamPhase::Reviewing])?;
        if self.review_position + 1 < self.flagged.len() {
            self.review_position += 1;
        } else {
            self.complete(now);
        }
        Ok(self.phase)
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless reviewing.
    pub fn review_previous(&mut self) -> Result<(), SessionStateError> {
        self.ensure_phase(&[ExamPhase::Reviewing])?;
        self.review_position = self.review_position.saturating_sub(1);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless reviewing.
    pub fn finish_review(&mut self, now: DateTime<Utc>) -> Result<(), SessionStateError> {
        self.ensure_phase(&[ExamPhase::Reviewing])?;
        self.complete(now);
        Ok(())
    }

    /// Consume one second of the countdown.
    ///
    /// Only an in-progress session changes; the tick that reaches zero moves it
    /// to review and every later tick is `Inactive`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.phase != ExamPhase::InProgress {
            return TickOutcome::Inactive;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.enter_review(now);
            return TickOutcome::Expired { phase: self.phase };
        }
        TickOutcome::Running {
            remaining_secs: self.remaining_secs,
        }
    }

    /// Score the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPhase` unless finished.
    pub fn report(&self, pass_mark_percent: u8) -> Result<ExamReport, SessionStateError> {
        self.ensure_phase(&[ExamPhase::Finished])?;
        Ok(ExamReport::score(
            &self.questions,
            &self.answers,
            pass_mark_percent,
        ))
    }

    fn enter_review(&mut self, now: DateTime<Utc>) {
        self.review_position = 0;
        if self.flagged.is_empty() {
            self.complete(now);
        } else {
            self.phase = ExamPhase::Reviewing;
        }
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.phase = ExamPhase::Finished;
        self.finished_at = Some(now);
    }

    fn ensure_phase(&self, allowed: &[ExamPhase]) -> Result<(), SessionStateError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SessionStateError::InvalidPhase { phase: self.phase })
        }
    }

    fn question(&self, id: QuestionId) -> Result<&Question, SessionStateError> {
        self.questions
            .iter()
            .find(|q| q.id() == id)
            .ok_or(SessionStateError::UnknownQuestion(id))
    }
}

fn check_questions(questions: &[Question]) -> Result<(), SessionStateError> {
    if questions.is_empty() {
        return Err(SessionStateError::Empty);
    }
    let mut seen = HashSet::with_capacity(questions.len());
    for q in questions {
        if !seen.insert(q.id()) {
            return Err(SessionStateError::DuplicateQuestion(q.id()));
        }
    }
    Ok(())
}

fn normalize_selection(
    question: &Question,
    mut selected: Vec<usize>,
) -> Result<Vec<usize>, SessionStateError> {
    selected.sort_unstable();
    selected.dedup();
    if let Some(&index) = selected.iter().find(|&&i| i >= question.options().len()) {
        return Err(SessionStateError::OptionOutOfRange {
            id: question.id(),
            index,
        });
    }
    if question.kind() == AnswerKind::Single && selected.len() > 1 {
        return Err(SessionStateError::TooManySelections {
            id: question.id(),
            count: selected.len(),
        });
    }
    Ok(selected)
}
