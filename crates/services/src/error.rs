//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{PreferencesError, SessionStateError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Reasons a session cannot be assembled from the question pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("no starred questions to practice")]
    NoStarredQuestions,
    #[error("no questions available for the selected domains")]
    EmptyPool,
    #[error("question count must be > 0")]
    InvalidCount,
    #[error(transparent)]
    Session(#[from] SessionStateError),
}

/// Errors emitted by `QuestionSource` when no fallback applies.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("question bank unavailable: {0}")]
    Unavailable(#[source] StorageError),
    #[error("built-in question bank unavailable: {0}")]
    Fallback(#[source] StorageError),
}

/// Errors emitted by `PreferencesService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferencesServiceError {
    #[error(transparent)]
    Preferences(#[from] PreferencesError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ExamService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error("select at least one domain before starting")]
    NoDomainsSelected,
    #[error("no exam session is active")]
    NoActiveSession,
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Preferences(#[from] PreferencesServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
