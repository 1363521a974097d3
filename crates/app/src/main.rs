use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use services::{CatalogSyncService, Clock};
use storage::repository::Storage;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    UnknownSubcommand(String),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::UnknownSubcommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
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

struct Args {
    db_url: String,
    questions_dir: PathBuf,
    suites: Vec<String>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- sync [--db <sqlite_url>] [--dir <path>] [--suite <name>]...");
    eprintln!();
    eprintln!("Reconciles <dir>/<suite>.csv question files into the database.");
    eprintln!("With no --suite flags, suites are discovered from *.csv files in <dir>.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db  sqlite:trainer.sqlite3");
    eprintln!("  --dir questions");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRAINER_DB_URL, TRAINER_QUESTIONS_DIR");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TRAINER_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://trainer.sqlite3".into(), normalize_sqlite_url);
        let mut questions_dir = std::env::var("TRAINER_QUESTIONS_DIR")
            .ok()
            .map_or_else(|| PathBuf::from("questions"), PathBuf::from);
        let mut suites = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--dir" => {
                    questions_dir = PathBuf::from(require_value(args, "--dir")?);
                }
                "--suite" => {
                    suites.push(require_value(args, "--suite")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            questions_dir,
            suites,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
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

/// Suites named after the `*.csv` files present in the questions directory.
fn discover_suites(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut suites = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            suites.push(stem.to_string());
        }
    }
    suites.sort();
    Ok(suites)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: sync when no subcommand is provided.
    match argv.first().map(String::as_str) {
        None | Some("sync") => {}
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => {}
        Some(first) => {
            let err = ArgsError::UnknownSubcommand(first.to_string());
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    }
    if argv.first().map(String::as_str) == Some("sync") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let args = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let sync = CatalogSyncService::new(Clock::default_clock(), storage.questions);

    let suites = if args.suites.is_empty() {
        match discover_suites(&args.questions_dir) {
            Ok(found) => found,
            Err(err) => {
                error!(
                    dir = %args.questions_dir.display(),
                    error = %err,
                    "cannot list questions directory"
                );
                return Err(err.into());
            }
        }
    } else {
        args.suites
    };

    if suites.is_empty() {
        warn!(dir = %args.questions_dir.display(), "no suites to sync");
        return Ok(());
    }

    let summary = sync.sync_all(&args.questions_dir, &suites).await;

    for report in &summary.reports {
        info!(
            suite = %report.suite,
            source = report.total_in_source,
            created = report.created,
            updated = report.updated,
            deactivated = report.deactivated,
            "suite reconciled"
        );
    }
    for suite in &summary.skipped {
        info!(suite = %suite, "suite skipped: no source file");
    }
    for failure in &summary.failures {
        error!(suite = %failure.suite, error = %failure.error, "suite failed");
    }

    if summary.all_failed() {
        return Err("catalog sync failed for every requested suite".into());
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
