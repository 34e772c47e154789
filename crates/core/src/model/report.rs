use std::collections::BTreeMap;

use crate::model::{Question, QuestionId};

/// Outcome for one question of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOutcome {
    pub id: QuestionId,
    pub domain: String,
    pub selected: Vec<usize>,
    pub correct: Vec<usize>,
    pub is_correct: bool,
}

impl QuestionOutcome {
    #[must_use]
    pub fn is_answered(&self) -> bool {
        !self.selected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainScore {
    pub total: usize,
    pub correct: usize,
}

/// Scored results of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamReport {
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub score_percent: u8,
    pub pass_mark_percent: u8,
    pub passed: bool,
    pub by_domain: BTreeMap<String, DomainScore>,
    pub outcomes: Vec<QuestionOutcome>,
}

impl ExamReport {
    /// Score `questions` against `answers`. Unanswered questions count as wrong.
    #[must_use]
    pub fn score(
        questions: &[Question],
        answers: &BTreeMap<QuestionId, Vec<usize>>,
        pass_mark_percent: u8,
    ) -> Self {
        let mut by_domain: BTreeMap<String, DomainScore> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(questions.len());

        for q in questions {
            let selected = answers.get(&q.id()).cloned().unwrap_or_default();
            let is_correct = q.is_correct(&selected);

            let entry = by_domain.entry(q.domain().to_string()).or_default();
            entry.total += 1;
            if is_correct {
                entry.correct += 1;
            }

            outcomes.push(QuestionOutcome {
                id: q.id(),
                domain: q.domain().to_string(),
                selected,
                correct: q.correct().to_vec(),
                is_correct,
            });
        }

        let total = outcomes.len();
        let answered = outcomes.iter().filter(|o| o.is_answered()).count();
        let correct = outcomes.iter().filter(|o| o.is_correct).count();
        let score_percent = percent(correct, total);

        Self {
            total,
            answered,
            correct,
            score_percent,
            pass_mark_percent,
            passed: score_percent >= pass_mark_percent,
            by_domain,
            outcomes,
        }
    }

    /// Questions answered incorrectly or left blank.
    pub fn missed(&self) -> impl Iterator<Item = &QuestionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_correct)
    }
}

impl DomainScore {
    #[must_use]
    pub fn percent(&self) -> u8 {
        percent(self.correct, self.total)
    }
}

// Rounded half up.
fn percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rounded = (part * 100 + total / 2) / total;
    u8::try_from(rounded.min(100)).unwrap_or(100)
}
