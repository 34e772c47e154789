use exam_core::model::{Preferences, PreferencesDraft, QuestionId};

use crate::error::PreferencesServiceError;
use crate::exam::ExamStore;

#[derive(Clone)]
pub struct PreferencesService {
    store: ExamStore,
}

impl PreferencesService {
    #[must_use]
    pub fn new(store: ExamStore) -> Self {
        Self { store }
    }

    /// Load persisted preferences (or defaults if missing or unreadable).
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` on storage failures.
    pub async fn load(&self) -> Result<Preferences, PreferencesServiceError> {
        let preferences = self.store.load_preferences().await?;
        Ok(preferences.unwrap_or_default())
    }

    /// Validate and persist new preferences.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` if validation fails or persistence fails.
    pub async fn save(
        &self,
        draft: PreferencesDraft,
    ) -> Result<Preferences, PreferencesServiceError> {
        let preferences = draft.validate()?;
        self.store.save_preferences(&preferences).await?;
        Ok(preferences)
    }

    /// Load, edit through a draft, validate and persist.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` if the edit is invalid or persistence fails.
    pub async fn update(
        &self,
        f: impl FnOnce(&mut PreferencesDraft),
    ) -> Result<Preferences, PreferencesServiceError> {
        let preferences = self.load().await?.edit(f)?;
        self.store.save_preferences(&preferences).await?;
        Ok(preferences)
    }

    /// Flip the persistent star on `id`; returns whether it is starred afterwards.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` on storage failures.
    pub async fn toggle_star(&self, id: QuestionId) -> Result<bool, PreferencesServiceError> {
        let mut preferences = self.load().await?;
        let starred = preferences.toggle_star(id);
        self.store.save_preferences(&preferences).await?;
        Ok(starred)
    }

    /// Replace the domain selection; a selection that normalizes to nothing
    /// keeps the previous one.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` on storage failures.
    pub async fn select_domains(
        &self,
        domains: Vec<String>,
    ) -> Result<Preferences, PreferencesServiceError> {
        let mut preferences = self.load().await?;
        preferences.select_domains(domains);
        self.store.save_preferences(&preferences).await?;
        Ok(preferences)
    }

    /// Forget stored preferences; the next load returns defaults.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` on storage failures.
    pub async fn reset(&self) -> Result<(), PreferencesServiceError> {
        self.store.clear_preferences().await?;
        Ok(())
    }

    /// Fill an empty domain selection with `available` and persist it.
    ///
    /// # Errors
    ///
    /// Returns `PreferencesServiceError` on storage failures.
    pub async fn load_with_domains(
        &self,
        available: Vec<String>,
    ) -> Result<Preferences, PreferencesServiceError> {
        let mut preferences = self.load().await?;
        if preferences.selected_domains().is_empty() && !available.is_empty() {
            preferences.select_domains(available);
            self.store.save_preferences(&preferences).await?;
        }
        Ok(preferences)
    }
}
