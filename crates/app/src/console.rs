use std::error::Error;

use exam_core::model::{ExamPhase, ExamSession};
use services::{BuildError, ExamError, ExamEvent, ExamService};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::terminal::{self, Input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run the exam on stdin/stdout until the user quits or input ends.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or the first session cannot be
/// loaded.
pub async fn run_exam(exam: &ExamService, starred_only: bool) -> Result<(), Box<dyn Error>> {
    let mut events = exam.subscribe();
    let resumed = exam.resume().await?;
    let resumed_active = resumed
        .as_ref()
        .is_some_and(|s| s.phase() != ExamPhase::Finished);

    if resumed_active {
        println!("Resuming your previous exam.");
    } else {
        if resumed.is_some() {
            exam.restart().await?;
        }
        if !start(exam, starred_only).await? {
            return Ok(());
        }
    }
    println!("{}\n", terminal::help_text(ExamPhase::InProgress));
    show(exam).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match apply(exam, terminal::parse_input(&line), starred_only).await {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(err) => println!("! {err}"),
                }
            }
            event = events.recv() => match event {
                Ok(ExamEvent::Expired { phase }) => {
                    println!("\nTime is up.");
                    debug!(%phase, "timer expired in console");
                    show(exam).await?;
                }
                Ok(ExamEvent::Tick { remaining_secs }) => {
                    if remaining_secs % 60 == 0 || remaining_secs <= 10 {
                        println!("[{} left]", terminal::format_clock(remaining_secs));
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    if exam.phase().await != ExamPhase::NotStarted {
        println!("Progress saved.");
    }
    Ok(())
}

/// Start a fresh session; returns false when none could be built.
async fn start(exam: &ExamService, starred_only: bool) -> Result<bool, ExamError> {
    match exam.start_exam(starred_only).await {
        Ok(session) => {
            println!("Exam started with {} questions.", session.len());
            Ok(true)
        }
        Err(ExamError::Build(BuildError::NoStarredQuestions)) => {
            println!("You have no starred questions yet. Star questions with `s` during an exam.");
            Ok(false)
        }
        Err(ExamError::Build(BuildError::EmptyPool)) => {
            println!("No questions match the selected domains.");
            Ok(false)
        }
        Err(ExamError::NoDomainsSelected) => {
            println!("Select at least one domain with --domain.");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

async fn show(exam: &ExamService) -> Result<(), ExamError> {
    let Some(session) = exam.current().await else {
        println!("No exam in progress. Type `restart` to begin.");
        return Ok(());
    };

    if session.phase() == ExamPhase::Finished {
        let report = exam.report().await?;
        println!("{}", terminal::render_report(&report));
        println!("Type `restart` for a new exam or `q` to quit.");
        return Ok(());
    }

    let preferences = exam.preferences_service().load().await?;
    let starred = terminal::focused_question(&session).is_some_and(|q| preferences.is_starred(q.id()));
    print!(
        "{}",
        terminal::render_question(&session, starred, preferences.timer_enabled())
    );
    Ok(())
}

async fn apply(exam: &ExamService, input: Input, starred_only: bool) -> Result<Flow, ExamError> {
    let session = exam.current().await;
    let phase = session.as_ref().map_or(ExamPhase::NotStarted, ExamSession::phase);
    let focused = session
        .as_ref()
        .and_then(terminal::focused_question)
        .map(|q| q.id());

    match input {
        Input::Quit => return Ok(Flow::Quit),
        Input::Help => {
            println!("{}", terminal::help_text(phase));
            return Ok(Flow::Continue);
        }
        Input::Unknown(raw) => {
            println!("Unknown command `{raw}`. Type `help` for commands.");
            return Ok(Flow::Continue);
        }
        Input::Show => {}
        Input::Restart => {
            exam.restart().await?;
            start(exam, starred_only).await?;
        }
        Input::Answer(selected) => {
            let id = focused.ok_or(ExamError::NoActiveSession)?;
            exam.record_answer(id, selected).await?;
        }
        Input::Clear => {
            let id = focused.ok_or(ExamError::NoActiveSession)?;
            exam.record_answer(id, Vec::new()).await?;
        }
        Input::Flag => {
            let id = focused.ok_or(ExamError::NoActiveSession)?;
            let flagged = exam.toggle_flag(id).await?;
            println!("{}", if flagged { "Flagged." } else { "Unflagged." });
        }
        Input::Star if focused.is_none() && phase == ExamPhase::Finished => {
            println!("Use `star <id>` with an id from the results.");
            return Ok(Flow::Continue);
        }
        Input::Star => {
            let id = focused.ok_or(ExamError::NoActiveSession)?;
            let starred = exam.toggle_star(id).await?;
            println!("{}", if starred { "Starred." } else { "Unstarred." });
        }
        Input::StarId(id) => {
            let starred = exam.toggle_star(id).await?;
            println!("#{id} {}", if starred { "starred." } else { "unstarred." });
            return Ok(Flow::Continue);
        }
        Input::Next if phase == ExamPhase::Reviewing => {
            exam.review_next().await?;
        }
        Input::Next => {
            exam.next().await?;
        }
        Input::Previous if phase == ExamPhase::Reviewing => {
            exam.review_previous().await?;
        }
        Input::Previous => {
            exam.previous().await?;
        }
        Input::Jump(number) => {
            exam.jump_to(number - 1).await?;
        }
        Input::Finish if phase == ExamPhase::Reviewing => {
            exam.finish_review().await?;
        }
        Input::Finish => {
            exam.finish().await?;
        }
    }

    show(exam).await?;
    Ok(Flow::Continue)
}
