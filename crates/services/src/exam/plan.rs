use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashSet};

use exam_core::model::{ExamSession, Question, QuestionId};

use crate::error::BuildError;

/// Builds a timed exam session by sampling the question pool.
pub struct SessionBuilder<'a> {
    requested: u32,
    starred: Option<&'a BTreeSet<QuestionId>>,
}

impl<'a> SessionBuilder<'a> {
    #[must_use]
    pub fn new(requested: u32) -> Self {
        Self {
            requested,
            starred: None,
        }
    }

    /// Restrict the pool to questions in `starred`.
    #[must_use]
    pub fn starred_only(mut self, starred: &'a BTreeSet<QuestionId>) -> Self {
        self.starred = Some(starred);
        self
    }

    /// Pick the questions for a session, in exam order.
    ///
    /// - The pool is de-duplicated by id, first occurrence kept.
    /// - With `starred_only`, only starred questions remain.
    /// - The survivors are shuffled and the first `min(requested, pool)` kept.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::InvalidCount` for a zero count,
    /// `BuildError::NoStarredQuestions` when starred-only has nothing starred and
    /// `BuildError::EmptyPool` when no question survives filtering.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        pool: impl IntoIterator<Item = Question>,
        rng: &mut R,
    ) -> Result<Vec<Question>, BuildError> {
        if self.requested == 0 {
            return Err(BuildError::InvalidCount);
        }
        if self.starred.is_some_and(BTreeSet::is_empty) {
            return Err(BuildError::NoStarredQuestions);
        }

        let mut seen = HashSet::new();
        let mut candidates: Vec<Question> = pool
            .into_iter()
            .filter(|q| self.starred.is_none_or(|starred| starred.contains(&q.id())))
            .filter(|q| seen.insert(q.id()))
            .collect();
        if candidates.is_empty() {
            return Err(BuildError::EmptyPool);
        }

        let take = usize::try_from(self.requested)
            .unwrap_or(usize::MAX)
            .min(candidates.len());
        candidates.as_mut_slice().shuffle(rng);
        candidates.truncate(take);
        Ok(candidates)
    }

    /// Plan the questions and start the session at `started_at`.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` as described on [`SessionBuilder::plan`].
    pub fn build<R: Rng + ?Sized>(
        &self,
        pool: impl IntoIterator<Item = Question>,
        rng: &mut R,
        started_at: DateTime<Utc>,
    ) -> Result<ExamSession, BuildError> {
        let questions = self.plan(pool, rng)?;
        Ok(ExamSession::start(questions, started_at)?)
    }
}

/// One-shot form of [`SessionBuilder`].
///
/// # Errors
///
/// Returns `BuildError` as described on [`SessionBuilder::plan`].
pub fn build_session<R: Rng + ?Sized>(
    pool: Vec<Question>,
    requested: u32,
    starred_only: bool,
    starred: &BTreeSet<QuestionId>,
    rng: &mut R,
    started_at: DateTime<Utc>,
) -> Result<ExamSession, BuildError> {
    let mut builder = SessionBuilder::new(requested);
    if starred_only {
        builder = builder.starred_only(starred);
    }
    builder.build(pool, rng, started_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AnswerKind, ExamPhase, QuestionDraft};
    use exam_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn build_question(id: u64, domain: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            domain: domain.into(),
            prompt: format!("Q{id}"),
            options: vec!["a".into(), "b".into()],
            kind: AnswerKind::Single,
            correct: vec![0],
            sources: Vec::new(),
        }
        .validate()
        .unwrap()
    }

    fn pool(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|id| {
                let domain = if id % 2 == 0 { "Platform_Security" } else { "Cloud_Native_Security" };
                build_question(id, domain)
            })
            .collect()
    }

    fn ids(questions: &[Question]) -> Vec<u64> {
        questions.iter().map(|q| q.id().value()).collect()
    }

    #[test]
    fn ten_questions_count_five_gives_five_unique_and_five_minutes() {
        let mut rng = StdRng::seed_from_u64(7);
        let session = build_session(pool(10), 5, false, &BTreeSet::new(), &mut rng, fixed_now())
            .unwrap();

        assert_eq!(session.len(), 5);
        assert_eq!(session.remaining_secs(), 300);
        assert_eq!(session.phase(), ExamPhase::InProgress);
        assert_eq!(session.position(), 0);
        assert!(session.answers().is_empty());
        assert!(session.flagged().is_empty());

        let unique: HashSet<_> = session.questions().iter().map(Question::id).collect();
        assert_eq!(unique.len(), 5);
        assert!(session.questions().iter().all(|q| q.id().value() <= 10));
    }

    #[test]
    fn size_is_min_of_requested_and_pool() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for requested in [1_u32, 3, 6, 50] {
                let picked = SessionBuilder::new(requested)
                    .plan(pool(6), &mut rng)
                    .unwrap();
                assert_eq!(picked.len(), (requested as usize).min(6));
                let unique: HashSet<_> = picked.iter().map(Question::id).collect();
                assert_eq!(unique.len(), picked.len());
            }
        }
    }

    #[test]
    fn shuffle_is_a_permutation_of_the_pool() {
        let mut rng = StdRng::seed_from_u64(42);
        let picked = SessionBuilder::new(100).plan(pool(12), &mut rng).unwrap();
        let mut sorted = ids(&picked);
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_gives_same_order() {
        let a = SessionBuilder::new(5)
            .plan(pool(10), &mut StdRng::seed_from_u64(3))
            .unwrap();
        let b = SessionBuilder::new(5)
            .plan(pool(10), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn starred_only_without_stars_always_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = build_session(pool(10), 5, true, &BTreeSet::new(), &mut rng, fixed_now())
            .unwrap_err();
        assert!(matches!(err, BuildError::NoStarredQuestions));

        let err = build_session(Vec::new(), 5, true, &BTreeSet::new(), &mut rng, fixed_now())
            .unwrap_err();
        assert!(matches!(err, BuildError::NoStarredQuestions));
    }

    #[test]
    fn starred_only_with_three_stars_and_large_count_gives_three() {
        let starred: BTreeSet<_> = [2, 5, 9].into_iter().map(QuestionId::new).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let session =
            build_session(pool(10), 50, true, &starred, &mut rng, fixed_now()).unwrap();

        assert_eq!(session.len(), 3);
        assert_eq!(session.remaining_secs(), 180);
        assert!(session.questions().iter().all(|q| starred.contains(&q.id())));
    }

    #[test]
    fn starred_ids_outside_pool_give_empty_pool() {
        let starred: BTreeSet<_> = [99].into_iter().map(QuestionId::new).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let err = build_session(pool(4), 5, true, &starred, &mut rng, fixed_now()).unwrap_err();
        assert!(matches!(err, BuildError::EmptyPool));
    }

    #[test]
    fn empty_pool_and_zero_count_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            SessionBuilder::new(5).plan(Vec::new(), &mut rng),
            Err(BuildError::EmptyPool)
        ));
        assert!(matches!(
            SessionBuilder::new(0).plan(pool(3), &mut rng),
            Err(BuildError::InvalidCount)
        ));
    }

    #[test]
    fn duplicate_ids_in_pool_are_collapsed() {
        let mut duplicated = pool(3);
        duplicated.extend(pool(3));
        let mut rng = StdRng::seed_from_u64(5);
        let picked = SessionBuilder::new(10).plan(duplicated, &mut rng).unwrap();
        assert_eq!(picked.len(), 3);
    }
}
