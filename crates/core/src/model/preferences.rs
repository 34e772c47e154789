use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::QuestionId;

pub const DEFAULT_QUESTION_COUNT: u32 = 5;
pub const DEFAULT_PASS_MARK_PERCENT: u8 = 75;

/// User preferences that survive across exam sessions.
///
/// Persisted as one record so domains, starred questions and toggles are
/// always loaded and saved together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PreferencesDraft", into = "PreferencesDraft")]
pub struct Preferences {
    question_count: u32,
    selected_domains: Vec<String>,
    starred: BTreeSet<QuestionId>,
    timer_enabled: bool,
    pass_mark_percent: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesDraft {
    pub question_count: u32,
    pub selected_domains: Vec<String>,
    pub starred: BTreeSet<QuestionId>,
    pub timer_enabled: bool,
    pub pass_mark_percent: u8,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("question count must be > 0")]
    InvalidQuestionCount,

    #[error("pass mark must be between 1 and 100, got {0}")]
    InvalidPassMark(u8),
}

impl Default for PreferencesDraft {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            selected_domains: Vec::new(),
            starred: BTreeSet::new(),
            timer_enabled: true,
            pass_mark_percent: DEFAULT_PASS_MARK_PERCENT,
        }
    }
}

impl PreferencesDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft into persisted preferences.
    ///
    /// Domains are trimmed, blank entries dropped and duplicates removed while
    /// keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesError` if the question count is zero or the pass
    /// mark is outside `1..=100`.
    pub fn validate(self) -> Result<Preferences, PreferencesError> {
        if self.question_count == 0 {
            return Err(PreferencesError::InvalidQuestionCount);
        }
        if !(1..=100).contains(&self.pass_mark_percent) {
            return Err(PreferencesError::InvalidPassMark(self.pass_mark_percent));
        }

        let mut seen = BTreeSet::new();
        let selected_domains = self
            .selected_domains
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect();

        Ok(Preferences {
            question_count: self.question_count,
            selected_domains,
            starred: self.starred,
            timer_enabled: self.timer_enabled,
            pass_mark_percent: self.pass_mark_percent,
        })
    }
}

impl TryFrom<PreferencesDraft> for Preferences {
    type Error = PreferencesError;

    fn try_from(draft: PreferencesDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Preferences> for PreferencesDraft {
    fn from(p: Preferences) -> Self {
        Self {
            question_count: p.question_count,
            selected_domains: p.selected_domains,
            starred: p.starred,
            timer_enabled: p.timer_enabled,
            pass_mark_percent: p.pass_mark_percent,
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            selected_domains: Vec::new(),
            starred: BTreeSet::new(),
            timer_enabled: true,
            pass_mark_percent: DEFAULT_PASS_MARK_PERCENT,
        }
    }
}

impl Preferences {
    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn selected_domains(&self) -> &[String] {
        &self.selected_domains
    }

    #[must_use]
    pub fn starred(&self) -> &BTreeSet<QuestionId> {
        &self.starred
    }

    #[must_use]
    pub fn is_starred(&self, id: QuestionId) -> bool {
        self.starred.contains(&id)
    }

    #[must_use]
    pub fn timer_enabled(&self) -> bool {
        self.timer_enabled
    }

    #[must_use]
    pub fn pass_mark_percent(&self) -> u8 {
        self.pass_mark_percent
    }

    /// Flip the star on `id`; returns whether it is starred afterwards.
    pub fn toggle_star(&mut self, id: QuestionId) -> bool {
        if self.starred.remove(&id) {
            false
        } else {
            self.starred.insert(id);
            true
        }
    }

    /// Replace the domain selection, keeping it if `domains` normalizes to nothing.
    pub fn select_domains(&mut self, domains: impl IntoIterator<Item = String>) {
        let mut seen = BTreeSet::new();
        let selected: Vec<String> = domains
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect();
        if !selected.is_empty() {
            self.selected_domains = selected;
        }
    }

    /// Builder-style edit through a draft.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesError` if the edited draft is invalid.
    pub fn edit(
        self,
        f: impl FnOnce(&mut PreferencesDraft),
    ) -> Result<Preferences, PreferencesError> {
        let mut draft = PreferencesDraft::from(self);
        f(&mut draft);
        draft.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_exam_layout() {
        let prefs = Preferences::default();
        assert_eq!(prefs.question_count(), 5);
        assert_eq!(prefs.pass_mark_percent(), 75);
        assert!(prefs.timer_enabled());
        assert!(prefs.selected_domains().is_empty());
    }

    #[test]
    fn draft_normalizes_domains() {
        let prefs = PreferencesDraft {
            selected_domains: vec![
                " Platform_Security ".into(),
                String::new(),
                "Platform_Security".into(),
                "Cloud_Native_Security".into(),
            ],
            ..PreferencesDraft::new()
        }
        .validate()
        .unwrap();
        assert_eq!(
            prefs.selected_domains(),
            ["Platform_Security".to_string(), "Cloud_Native_Security".to_string()]
        );
    }

    #[test]
    fn draft_rejects_zero_count_and_bad_pass_mark() {
        let zero = PreferencesDraft {
            question_count: 0,
            ..PreferencesDraft::new()
        };
        assert_eq!(zero.validate(), Err(PreferencesError::InvalidQuestionCount));

        let mark = PreferencesDraft {
            pass_mark_percent: 101,
            ..PreferencesDraft::new()
        };
        assert_eq!(mark.validate(), Err(PreferencesError::InvalidPassMark(101)));
    }

    #[test]
    fn star_toggle_is_an_involution() {
        let mut prefs = Preferences::default();
        let id = QuestionId::new(4);
        assert!(prefs.toggle_star(id));
        assert!(prefs.is_starred(id));
        assert!(!prefs.toggle_star(id));
        assert!(prefs.starred().is_empty());
    }

    #[test]
    fn select_domains_never_clears_selection() {
        let mut prefs = Preferences::default();
        prefs.select_domains(vec!["Platform_Security".to_string()]);
        prefs.select_domains(vec!["   ".to_string()]);
        assert_eq!(prefs.selected_domains(), ["Platform_Security".to_string()]);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let prefs: Preferences = serde_json::from_str(r#"{"starred":[3,1]}"#).unwrap();
        assert_eq!(prefs.question_count(), DEFAULT_QUESTION_COUNT);
        assert!(prefs.is_starred(QuestionId::new(3)));
    }
}
