mod countdown;
mod plan;
mod service;
mod store;

// Public API of the exam subsystem.
pub use countdown::{Countdown, ExamEvent, TICK_PERIOD};
pub use plan::{SessionBuilder, build_session};
pub use service::ExamService;
pub use store::{ExamStore, PREFERENCES_KEY, SESSION_KEY};
