//! sleep-tracker: CLI host for the sleep tracking coordinator.
//!
//! Each invocation builds a coordinator over the local database, waits for it
//! to load tonight, dispatches at most one intent and prints what it observes.
//!
//! ## Subcommands
//!
//! - `start`: begin tracking a night
//! - `stop`: close the night in progress
//! - `clear`: delete every recorded night
//! - `status`: show the night in progress, if any
//! - `history`: list recorded nights, most recent first

mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use sleep_core::{
    PlainNightFormatter, SessionCoordinator, SleepError, SleepNight, SqliteSleepDao,
    StorageConfig, SystemClock, TrackerConfig,
};

#[derive(Parser)]
#[command(name = "sleep-tracker")]
#[command(about = "Track nights of sleep")]
#[command(version)]
struct Cli {
    /// Database file to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a night
    Start,

    /// Stop tracking the night in progress
    Stop,

    /// Delete every recorded night
    Clear,

    /// Show the night in progress
    Status,

    /// List recorded nights
    History,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::try_default() {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("sleep-tracker: {err}");
            std::process::exit(1);
        }
    };
    let logs_dir = match storage.ensure_directories() {
        Ok(()) => Some(storage.logs_dir()),
        Err(err) => {
            eprintln!("sleep-tracker: {err}; logging to stderr");
            None
        }
    };
    let logging_guard = logging::init(logs_dir.as_deref());

    if let Err(err) = run(cli, &storage).await {
        tracing::error!(error = %err, "sleep-tracker failed");
        eprintln!("sleep-tracker: {err}");
        // Flush the log writer; exit skips destructors.
        drop(logging_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, storage: &StorageConfig) -> Result<(), SleepError> {
    let config = TrackerConfig::load(&storage.config_file());
    let db_path = cli.db.unwrap_or_else(|| config.database_path(storage));
    let dao = Arc::new(SqliteSleepDao::new(db_path)?);
    tracing::debug!(path = %dao.path().display(), "Night database opened");
    let formatter = PlainNightFormatter::new(config.time_format());
    let coordinator = SessionCoordinator::with_parts(
        dao,
        Arc::new(formatter.clone()),
        Arc::new(SystemClock),
    );
    coordinator.wait_initialized().await;

    let pending = match cli.command {
        Commands::Start => Some(coordinator.start_tracking()),
        Commands::Stop => Some(coordinator.stop_tracking()),
        Commands::Clear => Some(coordinator.clear_all()),
        Commands::Status | Commands::History => None,
    };
    if let Some(pending) = pending {
        pending.await?;
    }

    match cli.command {
        Commands::History => print_history(&coordinator),
        _ => print_tonight(coordinator.tonight().as_ref(), &formatter),
    }

    coordinator.shutdown();
    Ok(())
}

fn print_tonight(tonight: Option<&SleepNight>, formatter: &PlainNightFormatter) {
    let Some(night) = tonight else {
        println!("No sleep in progress");
        return;
    };

    let started = formatter.format_time(night.start_time_milli);
    if night.is_open() {
        println!("Night {} in progress since {}", night.night_id, started);
    } else {
        println!(
            "Night {} ended at {} ({})",
            night.night_id,
            formatter.format_time(night.end_time_milli),
            sleep_core::format::format_duration(night.duration_milli())
        );
    }
}

fn print_history(coordinator: &SessionCoordinator) {
    let rows = coordinator.display_history();
    if rows.is_empty() {
        println!("No nights recorded");
        return;
    }

    for row in rows {
        match (&row.end, &row.duration) {
            (Some(end), Some(duration)) => println!(
                "#{:<4} {} -> {}  {}  quality: {}",
                row.night_id, row.start, end, duration, row.quality
            ),
            _ => println!(
                "#{:<4} {} -> (in progress)  quality: {}",
                row.night_id, row.start, row.quality
            ),
        }
    }
}
