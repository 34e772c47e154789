//! Plain-text rendering and input parsing for the console exam.

use std::fmt::Write as _;

use exam_core::model::{ExamPhase, ExamReport, ExamSession, Question, QuestionId};

/// One line of user input, interpreted against the current phase by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Option letters, e.g. `a` or `a c`.
    Answer(Vec<usize>),
    Clear,
    Next,
    Previous,
    /// 1-based question number.
    Jump(usize),
    Flag,
    Star,
    /// Star by bank id, e.g. `star #12` from the results screen.
    StarId(QuestionId),
    Finish,
    Restart,
    Show,
    Help,
    Quit,
    Unknown(String),
}

/// Parse a command line. Option letters are case-insensitive and may be
/// separated by spaces or commas.
#[must_use]
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let lower = line.to_ascii_lowercase();
    match lower.as_str() {
        "" | "show" => return Input::Show,
        "n" | "next" => return Input::Next,
        "p" | "prev" | "previous" => return Input::Previous,
        "f" | "flag" => return Input::Flag,
        "s" | "star" => return Input::Star,
        "done" | "finish" => return Input::Finish,
        "clear" => return Input::Clear,
        "restart" => return Input::Restart,
        "h" | "?" | "help" => return Input::Help,
        "q" | "quit" | "exit" => return Input::Quit,
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("g ").or_else(|| lower.strip_prefix("go ")) {
        return match rest.trim().parse::<usize>() {
            Ok(number) if number > 0 => Input::Jump(number),
            _ => Input::Unknown(line.to_string()),
        };
    }

    if let Some(rest) = lower.strip_prefix("s ").or_else(|| lower.strip_prefix("star ")) {
        let raw = rest.trim();
        if let Ok(id) = raw.strip_prefix('#').unwrap_or(raw).parse::<QuestionId>() {
            return Input::StarId(id);
        }
    }

    parse_letters(&lower).map_or_else(|| Input::Unknown(line.to_string()), Input::Answer)
}

fn parse_letters(raw: &str) -> Option<Vec<usize>> {
    let mut selected = Vec::new();
    for c in raw.chars() {
        match c {
            'a'..='z' => selected.push(usize::from(c as u8 - b'a')),
            ' ' | ',' => {}
            _ => return None,
        }
    }
    (!selected.is_empty()).then_some(selected)
}

fn option_letter(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map_or('?', |i| char::from(b'a' + i))
}

fn letters(indices: &[usize]) -> String {
    if indices.is_empty() {
        return "-".to_string();
    }
    indices
        .iter()
        .map(|i| option_letter(*i).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `mm:ss`, minutes unbounded.
#[must_use]
pub fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// The question the user is looking at in the current phase.
#[must_use]
pub fn focused_question(session: &ExamSession) -> Option<&Question> {
    match session.phase() {
        ExamPhase::InProgress => Some(session.current_question()),
        ExamPhase::Reviewing => session.current_review_question(),
        ExamPhase::NotStarted | ExamPhase::Finished => None,
    }
}

/// Render the focused question with its options and markers.
#[must_use]
pub fn render_question(session: &ExamSession, starred: bool, show_timer: bool) -> String {
    let mut out = String::new();
    let Some(question) = focused_question(session) else {
        if session.phase() == ExamPhase::Reviewing {
            out.push_str("No flagged questions left. Type `finish` to see your score.\n");
        }
        return out;
    };

    if show_timer {
        let _ = write!(out, "[{}] ", format_clock(session.remaining_secs()));
    }
    match session.phase() {
        ExamPhase::Reviewing => {
            let _ = write!(
                out,
                "Review {}/{}",
                session.review_position() + 1,
                session.flagged().len()
            );
        }
        _ => {
            let _ = write!(out, "Question {}/{}", session.position() + 1, session.len());
        }
    }
    let _ = write!(out, "  ({})", question.domain());
    if session.is_flagged(question.id()) {
        out.push_str("  [flagged]");
    }
    if starred {
        out.push_str("  [starred]");
    }
    out.push('\n');

    let _ = writeln!(out, "{}", question.prompt());
    let selected = session.answer_for(question.id()).unwrap_or_default();
    for (index, option) in question.options().iter().enumerate() {
        let marker = if selected.contains(&index) { '*' } else { ' ' };
        let _ = writeln!(out, " {marker} {}) {option}", option_letter(index));
    }
    let _ = writeln!(
        out,
        "({}; answered {}/{})",
        question.kind().as_str(),
        session.answered_count(),
        session.len()
    );
    out
}

/// Render a scored attempt.
#[must_use]
pub fn render_report(report: &ExamReport) -> String {
    let mut out = String::new();
    let verdict = if report.passed { "PASSED" } else { "FAILED" };
    let _ = writeln!(
        out,
        "Score: {}% ({}/{} correct, {} answered) {verdict}, pass mark {}%",
        report.score_percent, report.correct, report.total, report.answered, report.pass_mark_percent
    );

    out.push_str("By domain:\n");
    for (domain, score) in &report.by_domain {
        let _ = writeln!(
            out,
            "  {domain}: {}/{} ({}%)",
            score.correct,
            score.total,
            score.percent()
        );
    }

    let mut missed = report.missed().peekable();
    if missed.peek().is_some() {
        out.push_str("Missed:\n");
        for outcome in missed {
            let _ = writeln!(
                out,
                "  #{} {}: yours {}, correct {}",
                outcome.id,
                outcome.domain,
                letters(&outcome.selected),
                letters(&outcome.correct)
            );
        }
    }
    out
}

#[must_use]
pub fn help_text(phase: ExamPhase) -> &'static str {
    match phase {
        ExamPhase::InProgress => {
            "a / a c   answer with option letters\n\
             clear     clear your answer\n\
             n / p     next / previous question\n\
             g <n>     go to question n\n\
             f / s     flag for review / star for later practice\n\
             finish    end the exam and review flagged questions\n\
             q         quit (progress is saved)"
        }
        ExamPhase::Reviewing => {
            "a / a c   change your answer\n\
             n / p     next / previous flagged question\n\
             f / s     unflag / star\n\
             finish    end the review and see your score\n\
             q         quit (progress is saved)"
        }
        ExamPhase::Finished => {
            "star <id> star a missed question, e.g. `star #12`\n\
             restart   start a new exam\n\
             q         quit"
        }
        ExamPhase::NotStarted => {
            "restart   start a new exam\n\
             q         quit"
        }
    }
}
