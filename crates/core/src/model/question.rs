use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ANSWER KIND ───────────────────────────────────────────────────────────────
//

/// How many options a question expects the candidate to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerKind {
    #[serde(rename = "single-choice")]
    Single,
    #[serde(rename = "multiple-choice")]
    Multiple,
}

impl AnswerKind {
    /// Label used by the bundled question bank.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerKind::Single => "single-choice",
            AnswerKind::Multiple => "multiple-choice",
        }
    }

    /// Parse the bank label. Accepts the short forms `single` / `multiple` as well.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "single-choice" | "single" => Some(AnswerKind::Single),
            "multiple-choice" | "multiple" => Some(AnswerKind::Multiple),
            _ => None,
        }
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyPrompt,

    #[error("question domain cannot be empty")]
    EmptyDomain,

    #[error("a question needs at least two options, got {count}")]
    TooFewOptions { count: usize },

    #[error("option {index} is empty")]
    EmptyOption { index: usize },

    #[error("a question needs at least one correct option")]
    NoCorrectOption,

    #[error("correct option {index} is out of range for {options} options")]
    CorrectOutOfRange { index: usize, options: usize },

    #[error("single-choice question must have exactly one correct option, got {count}")]
    AmbiguousSingleChoice { count: usize },
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated question as it arrives from the bank or an import file.
///
/// Field names follow the bank's column names so a seed file can be a plain
/// dump of the `questions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub domain: String,
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(rename = "question_type")]
    pub kind: AnswerKind,
    #[serde(rename = "correct_answers")]
    pub correct: Vec<usize>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<String>,
}

/// The bank stores `sources` as a nullable JSON column.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl QuestionDraft {
    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is blank, there are fewer than two
    /// options, or the correct indices do not fit the options and answer kind.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        let domain = self.domain.trim().to_string();
        if domain.is_empty() {
            return Err(QuestionError::EmptyDomain);
        }
        if self.options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: self.options.len(),
            });
        }
        if let Some(index) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::EmptyOption { index });
        }

        let mut correct = self.correct;
        correct.sort_unstable();
        correct.dedup();
        if correct.is_empty() {
            return Err(QuestionError::NoCorrectOption);
        }
        if let Some(&index) = correct.iter().find(|&&i| i >= self.options.len()) {
            return Err(QuestionError::CorrectOutOfRange {
                index,
                options: self.options.len(),
            });
        }
        if self.kind == AnswerKind::Single && correct.len() != 1 {
            return Err(QuestionError::AmbiguousSingleChoice {
                count: correct.len(),
            });
        }

        let sources = self
            .sources
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Question {
            id: self.id,
            domain,
            prompt,
            options: self.options,
            kind: self.kind,
            correct,
            sources,
        })
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A validated multiple-choice question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    domain: String,
    prompt: String,
    options: Vec<String>,
    kind: AnswerKind,
    correct: Vec<usize>,
    sources: Vec<String>,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(q: Question) -> Self {
        QuestionDraft {
            id: q.id,
            domain: q.domain,
            prompt: q.prompt,
            options: q.options,
            kind: q.kind,
            correct: q.correct,
            sources: q.sources,
        }
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn kind(&self) -> AnswerKind {
        self.kind
    }

    /// Correct option indices, sorted ascending.
    #[must_use]
    pub fn correct(&self) -> &[usize] {
        &self.correct
    }

    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// An answer is correct only when it selects exactly the correct set.
    ///
    /// `selected` must already be sorted and de-duplicated, which is how the
    /// session stores answers.
    #[must_use]
    pub fn is_correct(&self, selected: &[usize]) -> bool {
        selected == self.correct.as_slice()
    }
}
