//! Scheduled jobs for simcheck.
//!
//! Meant to be started by cron every few minutes. Overlapping starts are
//! harmless: the run that cannot take the lock exits right away.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use simcheck_common::db_util::{AdvisoryLock, PgStore};
use simcheck_common::lock::{CronLock, FileLock};
use simcheck_common::pipeline::{self, RunOutcome};
use simcheck_common::provider::{FilesystemProvider, ProviderRegistry};
use simcheck_common::review;
use simcheck_common::store::SubmissionStore;
use simcheck_common::{
    CRON_ADVISORY_LOCK_KEY, DEFAULT_LOCK_FILE, DEFAULT_MINIMUM_MATCH_TOKENS, PipelineSettings,
    TokenizerKind,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LockKind {
    /// A lock file on the local host
    File,
    /// A Postgres advisory lock shared by every host on the database
    Database,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Stop starting new work after this many seconds
    #[arg(long, env = "CRON_STOP_SECONDS")]
    stop_seconds: Option<u64>,

    /// How concurrent runs are kept apart
    #[arg(long, value_enum, default_value = "file", env = "SIMCHECK_LOCK")]
    lock: LockKind,

    /// Lock file used with `--lock file`
    #[arg(long, default_value = DEFAULT_LOCK_FILE, env = "SIMCHECK_LOCK_FILE")]
    lock_file: PathBuf,

    /// Root directory of the filesystem provider
    #[arg(long, default_value = "submissions", env = "SIMCHECK_SUBMISSION_ROOT")]
    submission_root: PathBuf,

    /// Also compare submissions of the same student with each other
    #[arg(long, env = "SIMCHECK_ALLOW_SAME_STUDENT")]
    allow_same_student: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, tokenize and match new submissions (the default)
    Cron,
    /// Throw away tokens and comparisons of an exercise and fetch it again
    Reload { exercise_id: u32 },
    /// Delete the comparisons of an exercise that nobody reviewed and match it again
    Clean { exercise_id: u32 },
    /// Change an exercise's tokenizer and threshold, then redo it from scratch
    Configure {
        exercise_id: u32,
        #[arg(long, value_enum)]
        tokenizer: TokenizerKind,
        #[arg(long, default_value_t = DEFAULT_MINIMUM_MATCH_TOKENS)]
        minimum_match_tokens: u32,
    },
    /// Print the students of a course with suspicious reviews as JSON
    Marked { course_id: u32 },
}

impl Cli {
    fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            stop_after: self.stop_seconds.map(Duration::from_secs),
            exclude_same_student: !self.allow_same_student,
        }
    }

    fn providers(&self) -> ProviderRegistry {
        let mut providers = ProviderRegistry::new();
        providers.register(
            "filesystem",
            Box::new(FilesystemProvider::new(&self.submission_root)),
        );
        providers
    }
}

fn cron<L: CronLock>(cli: &Cli, lock: &L, store: &mut PgStore) -> Result<bool> {
    let report = pipeline::run_cron(lock, store, &cli.providers(), &cli.settings())?;
    info!(
        "Run finished ({:?}): {} courses, {} tokenized, {} rejected, {} matched.",
        report.outcome, report.courses, report.tokenized, report.rejected, report.matched
    );
    Ok(report.outcome != RunOutcome::MatcherStopped)
}

fn reload(cli: &Cli, store: &mut PgStore, exercise_id: u32) -> Result<()> {
    let exercise = store.get_exercise_by_id(exercise_id)?;
    let course = store.get_course_by_id(exercise.course_id)?;
    let providers = cli.providers();
    let provider = providers.get(&course.provider)?;
    if !provider.supports_reload() {
        bail!("Provider {} of course {} cannot reload", course.provider, course.key);
    }
    provider.reload(&exercise, store)?;
    info!("Exercise {} reloaded, it will be matched on the next run.", exercise.key);
    Ok(())
}

fn run(cli: &Cli) -> Result<bool> {
    let mut store = PgStore::connect(&cli.database_url)?;
    info!("Database connection established.");

    match cli.command.as_ref().unwrap_or(&Command::Cron) {
        Command::Cron => match cli.lock {
            LockKind::File => cron(cli, &FileLock::new(&cli.lock_file), &mut store),
            LockKind::Database => cron(
                cli,
                &AdvisoryLock::new(&cli.database_url, CRON_ADVISORY_LOCK_KEY),
                &mut store,
            ),
        },
        Command::Reload { exercise_id } => reload(cli, &mut store, *exercise_id).map(|()| true),
        Command::Clean { exercise_id } => {
            let removed = store.clean_for_exercise(*exercise_id)?;
            info!("Deleted {removed} unreviewed comparisons of exercise #{exercise_id}, it will be matched on the next run.");
            Ok(true)
        }
        Command::Configure {
            exercise_id,
            tokenizer,
            minimum_match_tokens,
        } => {
            review::configure_exercise(&mut store, *exercise_id, *tokenizer, *minimum_match_tokens)?;
            Ok(true)
        }
        Command::Marked { course_id } => {
            let suspects = review::marked_students(&mut store, *course_id)?;
            let json = serde_json::to_string_pretty(&suspects)
                .context("Failed to serialize the marked students")?;
            println!("{json}");
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
