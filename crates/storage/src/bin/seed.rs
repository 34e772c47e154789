use std::fmt;

use exam_core::model::{Question, QuestionDraft};
use storage::fallback::builtin_questions;
use storage::repository::Storage;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    file: Option<String>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("EXAM_DB_URL").unwrap_or_else(|_| "sqlite:questions.sqlite3?mode=rwc".into());
        let mut file = std::env::var("EXAM_SEED_FILE").ok();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--file" => {
                    file = Some(require_value(&mut args, "--file")?);
                }
                "--builtin" => {
                    file = None;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, file })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   SQLite URL (default: sqlite:questions.sqlite3?mode=rwc)");
    eprintln!("  --file <path>       JSON array of question rows to import");
    eprintln!("  --builtin           Import the built-in question list (default)");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  EXAM_DB_URL, EXAM_SEED_FILE");
}

/// Parse a JSON dump of question rows, keeping the rows that validate.
fn parse_questions(raw: &str) -> Result<Vec<Question>, serde_json::Error> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut questions = Vec::with_capacity(rows.len());
    for (row, value) in rows.into_iter().enumerate() {
        let draft = match serde_json::from_value::<QuestionDraft>(value) {
            Ok(draft) => draft,
            Err(err) => {
                warn!(row, %err, "skipping malformed question row");
                continue;
            }
        };
        let id = draft.id;
        match draft.validate() {
            Ok(question) => questions.push(question),
            Err(err) => warn!(%id, %err, "skipping invalid question"),
        }
    }
    Ok(questions)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let questions = match args.file.as_deref() {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            parse_questions(&raw)?
        }
        None => builtin_questions(),
    };

    let storage = Storage::sqlite(&args.db_url).await?;
    for question in &questions {
        storage.questions.upsert_question(question).await?;
    }
    let domains = storage.questions.available_domains().await?;
    info!(count = questions.len(), domains = domains.len(), "seed complete");

    println!(
        "Seeded {} questions across {} domains into {}",
        questions.len(),
        domains.len(),
        args.db_url
    );

    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_dump_keeps_valid_rows() {
        let raw = r#"[
            {
                "id": 1,
                "domain": "Platform_Security",
                "question": "Which tool signs images?",
                "options": ["cosign", "etcd"],
                "question_type": "single-choice",
                "correct_answers": [0],
                "sources": null
            },
            { "id": 2, "domain": "Platform_Security", "question": "Broken row" },
            {
                "id": 3,
                "domain": "Platform_Security",
                "question": "Only one option",
                "options": ["a"],
                "question_type": "single-choice",
                "correct_answers": [0]
            },
            {
                "id": 4,
                "domain": "Cloud_Native_Security",
                "question": "Pick both",
                "options": ["x", "y", "z"],
                "question_type": "multiple-choice",
                "correct_answers": [0, 2],
                "sources": ["https://kubernetes.io/docs/"]
            }
        ]"#;

        let questions = parse_questions(raw).unwrap();
        let ids: Vec<u64> = questions.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, [1, 4]);
        assert!(questions[0].sources().is_empty());
    }

    #[test]
    fn non_array_file_is_an_error() {
        assert!(parse_questions(r#"{"id": 1}"#).is_err());
    }
}
