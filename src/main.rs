use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod catalog;
mod config;
mod engine;
mod env;
mod networking;
mod storage;
mod sync;
mod ui;

use crate::config::Settings;
use crate::engine::{PatchEngine, StateOutcome};
use crate::sync::SyncOptions;

#[derive(Parser, Debug)]
#[command(
    name = "fastpatch",
    author,
    version,
    about = "Waits for a new game build and downloads it from the webseed mirrors in parallel"
)]
struct Cli {
    /// Game directory to synchronize. Its name selects the universe unless --universe is given.
    #[arg(long, short)]
    destination: Option<PathBuf>,

    /// Universe to download, matched case-insensitively.
    #[arg(long, short)]
    universe: Option<String>,

    #[arg(long, default_value = env::DEFAULT_CATALOG_URL)]
    catalog_url: String,

    /// Parallel file downloads.
    #[arg(long, short, default_value_t = sync::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Pause before retrying a failed file.
    #[arg(long, default_value_t = sync::DEFAULT_RETRY_DELAY.as_secs())]
    retry_delay_secs: u64,

    /// Give up on a file after this many attempts instead of retrying forever.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Launcher state file to update once the download completes.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Download the current build right away instead of waiting for a new one.
    #[arg(long, short)]
    force: bool,

    /// Seconds between catalog checks while waiting for a new build.
    #[arg(long, default_value_t = config::DEFAULT_POLL_INTERVAL.as_secs())]
    poll_secs: u64,
}

impl Cli {
    fn into_settings(self) -> Settings {
        let defaults = Settings::default();
        Settings {
            destination: self.destination.unwrap_or(defaults.destination),
            universe: self.universe,
            catalog_url: self.catalog_url,
            state_file: self.state_file,
            force: self.force,
            poll_interval: Duration::from_secs(self.poll_secs.max(1)),
            sync: SyncOptions {
                concurrency: self.concurrency,
                retry_delay: Duration::from_secs(self.retry_delay_secs),
                max_attempts: self.max_attempts,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = Cli::parse().into_settings();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(ui::ProgressReporter::new().run(events_rx));

    let result = PatchEngine::new(settings).run(events_tx, &cancel).await;
    reporter.await.ok();

    match result {
        Ok(report) => {
            info!(
                "Download of {} build {} complete.",
                report.version.name, report.version.version
            );
            match report.state {
                StateOutcome::Updated(path) => {
                    info!("{} updated, the launcher will skip verification.", path.display())
                }
                StateOutcome::Missing(_) => {
                    info!("The launcher will verify the files on its next start.")
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
