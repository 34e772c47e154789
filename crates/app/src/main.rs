use std::fmt;

use services::{AppServices, Clock, ExamService, FallbackPolicy};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod console;
mod terminal;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCount { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Exam,
    Domains,
    Reset,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "exam" => Some(Self::Exam),
            "domains" => Some(Self::Domains),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    db_url: String,
    count: Option<u32>,
    domains: Vec<String>,
    starred_only: bool,
    policy: FallbackPolicy,
    no_timer: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [exam] [options]   # take a timed mock exam (default)");
    eprintln!("  cargo run -p app -- domains [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- reset   [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   question bank and saved progress (default: sqlite:exam.sqlite3)");
    eprintln!("  --count <n>         number of questions per exam (saved)");
    eprintln!("  --domain <name>     restrict to a domain; repeat for several (saved)");
    eprintln!("  --starred           practice starred questions only");
    eprintln!("  --no-timer          disable the countdown (saved)");
    eprintln!("  --no-fallback       fail instead of using built-in questions");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_STRICT_SOURCE=1, RUST_LOG");
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("EXAM_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("sqlite:exam.sqlite3".into()), normalize_sqlite_url),
            count: None,
            domains: Vec::new(),
            starred_only: false,
            policy: if env_flag("EXAM_STRICT_SOURCE") {
                FallbackPolicy::Strict
            } else {
                FallbackPolicy::Static
            },
            no_timer: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--count" => {
                    let value = require_value(args, "--count")?;
                    let count: u32 = value
                        .trim()
                        .parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| ArgsError::InvalidCount { raw: value.clone() })?;
                    parsed.count = Some(count);
                }
                "--domain" => {
                    parsed.domains.push(require_value(args, "--domain")?);
                }
                "--starred" => parsed.starred_only = true,
                "--no-timer" => parsed.no_timer = true,
                "--no-fallback" => parsed.policy = FallbackPolicy::Strict,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw.starts_with("sqlite::memory:") || raw.starts_with("sqlite://") || raw.contains("mode=memory") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Persist command-line overrides into the saved preferences.
async fn apply_overrides(exam: &ExamService, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.count.is_some() || args.no_timer {
        exam.update_preferences(|draft| {
            if let Some(count) = args.count {
                draft.question_count = count;
            }
            if args.no_timer {
                draft.timer_enabled = false;
            }
        })
        .await?;
    }

    if !args.domains.is_empty() {
        let available = exam.available_domains().await?;
        let (known, unknown): (Vec<String>, Vec<String>) = args
            .domains
            .iter()
            .map(|d| d.trim().to_string())
            .partition(|d| available.contains(d));
        for domain in &unknown {
            warn!(%domain, "ignoring unknown domain");
            eprintln!("unknown domain: {domain}");
        }
        exam.preferences_service().select_domains(known).await?;
    }
    Ok(())
}

async fn list_domains(exam: &ExamService) -> Result<(), Box<dyn std::error::Error>> {
    let preferences = exam.preferences().await?;
    for domain in exam.available_domains().await? {
        let marker = if preferences.selected_domains().contains(&domain) {
            '*'
        } else {
            ' '
        };
        println!(" {marker} {domain}");
    }
    println!(
        "{} questions per exam, {} starred, timer {}",
        preferences.question_count(),
        preferences.starred().len(),
        if preferences.timer_enabled() { "on" } else { "off" }
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: take an exam when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Exam,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Exam,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let services =
        AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), parsed.policy).await?;
    if services.seeded_bank() {
        eprintln!("Question bank was empty; loaded the built-in questions.");
    }
    let exam = services.exam();
    apply_overrides(&exam, &parsed).await?;

    match cmd {
        Command::Exam => console::run_exam(&exam, parsed.starred_only).await,
        Command::Domains => list_domains(&exam).await,
        Command::Reset => {
            exam.restart().await?;
            exam.preferences_service().reset().await?;
            println!("Saved exam and preferences cleared.");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
