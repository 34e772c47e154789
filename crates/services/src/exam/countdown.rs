use std::sync::Arc;
use std::time::Duration;

use exam_core::Clock;
use exam_core::model::{ExamPhase, ExamSession, TickOutcome};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::store::ExamStore;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Notifications published while an exam runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamEvent {
    Tick { remaining_secs: u32 },
    /// The timer ran out; the session moved to `phase`.
    Expired { phase: ExamPhase },
}

/// Background task consuming one second of the exam timer per tick.
///
/// Once stopped it never touches the session again. Dropping the handle stops
/// and aborts the task.
pub struct Countdown {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Spawn the countdown on the current tokio runtime.
    ///
    /// Each tick persists the session through `store` and publishes an
    /// [`ExamEvent`].
    #[must_use]
    pub fn spawn(
        session: Arc<Mutex<Option<ExamSession>>>,
        store: ExamStore,
        clock: Clock,
        events: broadcast::Sender<ExamEvent>,
    ) -> Self {
        let (cancel, cancelled) = watch::channel(false);
        let handle = tokio::spawn(run(session, store, clock, events, cancelled));
        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
        self.handle.abort();
    }
}

async fn run(
    session: Arc<Mutex<Option<ExamSession>>>,
    store: ExamStore,
    clock: Clock,
    events: broadcast::Sender<ExamEvent>,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = cancelled.changed() => {
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let mut guard = session.lock().await;
                // Stop requests are issued under the same lock.
                if *cancelled.borrow() {
                    break;
                }
                let Some(active) = guard.as_mut() else {
                    break;
                };

                let outcome = active.tick(clock.now());
                if outcome != TickOutcome::Inactive {
                    if let Err(err) = store.save_session(active).await {
                        warn!(%err, "failed to persist exam timer");
                    }
                }
                drop(guard);

                match outcome {
                    TickOutcome::Running { remaining_secs } => {
                        let _ = events.send(ExamEvent::Tick { remaining_secs });
                    }
                    TickOutcome::Expired { phase } => {
                        info!(%phase, "exam timer expired");
                        let _ = events.send(ExamEvent::Expired { phase });
                        break;
                    }
                    TickOutcome::Inactive => break,
                }
            }
        }
    }
}
