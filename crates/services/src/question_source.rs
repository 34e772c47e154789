use std::sync::Arc;

use exam_core::model::Question;
use storage::fallback::builtin_bank;
use storage::repository::{QuestionRepository, StorageError};
use tracing::warn;

use crate::error::SourceError;

/// What to do when the question bank cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Serve the built-in question list instead.
    #[default]
    Static,
    /// Surface the failure to the caller.
    Strict,
}

/// Question bank access with an optional built-in fallback.
#[derive(Clone)]
pub struct QuestionSource {
    primary: Arc<dyn QuestionRepository>,
    fallback: Arc<dyn QuestionRepository>,
    policy: FallbackPolicy,
}

impl QuestionSource {
    /// Wrap `primary`, falling back to the built-in bank.
    #[must_use]
    pub fn new(primary: Arc<dyn QuestionRepository>, policy: FallbackPolicy) -> Self {
        Self::with_fallback(primary, Arc::new(builtin_bank()), policy)
    }

    #[must_use]
    pub fn with_fallback(
        primary: Arc<dyn QuestionRepository>,
        fallback: Arc<dyn QuestionRepository>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
        }
    }

    /// Distinct domain labels, sorted.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` when the bank fails under `FallbackPolicy::Strict`,
    /// or when the built-in bank fails too.
    pub async fn available_domains(&self) -> Result<Vec<String>, SourceError> {
        match self.primary.available_domains().await {
            Ok(domains) => Ok(domains),
            Err(err) => {
                self.ensure_fallback_allowed(err, "available_domains")?;
                self.fallback
                    .available_domains()
                    .await
                    .map_err(SourceError::Fallback)
            }
        }
    }

    /// Questions in any of `domains` (all questions when empty).
    ///
    /// # Errors
    ///
    /// Returns `SourceError` when the bank fails under `FallbackPolicy::Strict`,
    /// or when the built-in bank fails too.
    pub async fn all_questions(&self, domains: &[String]) -> Result<Vec<Question>, SourceError> {
        match self.primary.all_questions(domains).await {
            Ok(questions) => Ok(questions),
            Err(err) => {
                self.ensure_fallback_allowed(err, "all_questions")?;
                self.fallback
                    .all_questions(domains)
                    .await
                    .map_err(SourceError::Fallback)
            }
        }
    }

    fn ensure_fallback_allowed(
        &self,
        err: StorageError,
        operation: &'static str,
    ) -> Result<(), SourceError> {
        match self.policy {
            FallbackPolicy::Static => {
                warn!(%err, operation, "question bank failed, using built-in questions");
                Ok(())
            }
            FallbackPolicy::Strict => Err(SourceError::Unavailable(err)),
        }
    }
}
