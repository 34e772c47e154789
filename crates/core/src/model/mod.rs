mod ids;
mod preferences;
mod question;
mod report;
mod session;

pub use ids::{ParseIdError, QuestionId};

pub use preferences::{
    DEFAULT_PASS_MARK_PERCENT, DEFAULT_QUESTION_COUNT, Preferences, PreferencesDraft,
    PreferencesError,
};
pub use question::{AnswerKind, Question, QuestionDraft, QuestionError};
pub use report::{DomainScore, ExamReport, QuestionOutcome};
pub use session::{
    ExamPhase, ExamSession, ExamSessionParts, SECONDS_PER_QUESTION, SessionStateError, TickOutcome,
};
