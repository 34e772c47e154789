#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod exam;
pub mod preferences_service;
pub mod question_source;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, BuildError, ExamError, PreferencesServiceError, SourceError};
pub use exam::{ExamEvent, ExamService, ExamStore, SessionBuilder, build_session};
pub use preferences_service::PreferencesService;
pub use question_source::{FallbackPolicy, QuestionSource};
