use std::path::PathBuf;
use std::time::Duration;

use crate::env;
use crate::sync::SyncOptions;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a run needs, resolved from the command line.
#[derive(Clone, Debug)]
pub struct Settings {
    pub destination: PathBuf,
    /// Defaults to the destination directory's name.
    pub universe: Option<String>,
    pub catalog_url: String,
    /// Defaults to the launcher's PatcherState next to the game folder.
    pub state_file: Option<PathBuf>,
    /// Download the build currently published instead of waiting for a new one.
    pub force: bool,
    pub poll_interval: Duration,
    pub sync: SyncOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination: env::current_dir(),
            universe: None,
            catalog_url: env::DEFAULT_CATALOG_URL.to_owned(),
            state_file: None,
            force: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sync: SyncOptions::default(),
        }
    }
}
