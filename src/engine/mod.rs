use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::engine::models::{Catalog, VersionDescriptor};
use crate::engine::state::SyncEvent;
use crate::engine::watch::{WatchError, wait_for_new_build};
use crate::env;
use crate::networking::{CatalogSource, FetchError, NetworkClient, RemoteCatalog};
use crate::storage::{ReconcileError, StateReconciler};
use crate::sync::{DownloadOrchestrator, SyncError};

pub mod models;
pub mod state;
pub mod watch;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unable to prepare destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot tell which universe {0} holds; pass --universe")]
    NoUniverseName(PathBuf),
    #[error("universe {0} is not listed in the catalog")]
    UnknownUniverse(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Reconcile(ReconcileError),
}

/// How the launcher state file fared after a completed download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateOutcome {
    Updated(PathBuf),
    /// The launcher will have to verify the files itself.
    Missing(PathBuf),
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub version: VersionDescriptor,
    pub state: StateOutcome,
}

pub struct PatchEngine {
    settings: Settings,
    networking: NetworkClient,
}

impl PatchEngine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            networking: NetworkClient::new(),
        }
    }

    /// Resolve the target build, download it, then mark it installed for the launcher.
    pub async fn run(
        &self,
        events: mpsc::UnboundedSender<SyncEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, EngineError> {
        let destination = self.prepare_destination().await?;
        let name = match &self.settings.universe {
            Some(name) => name.clone(),
            None => env::universe_from_dir(&destination)
                .ok_or_else(|| EngineError::NoUniverseName(destination.clone()))?,
        };

        let source = RemoteCatalog::new(self.networking.clone(), &self.settings.catalog_url);
        info!("engine: loading catalog from {}", self.settings.catalog_url);
        let current = find_universe(&source.catalog().await?, &name)?;
        info!("engine: current {} build is {}", current.name, current.version);

        let target = if self.settings.force {
            current
        } else {
            wait_for_new_build(&source, &current, self.settings.poll_interval, cancel).await?
        };
        info!(
            "engine: {} build {} selected, downloading",
            target.name, target.version
        );

        let manifest = self
            .networking
            .fetch_manifest(&target.manifest_location)
            .await?;
        DownloadOrchestrator::new(self.networking.clone(), self.settings.sync.clone())
            .with_events(events)
            .sync(&manifest, &destination, cancel)
            .await?;
        info!("engine: download of {} complete", target.name);

        let state_path = self
            .settings
            .state_file
            .clone()
            .unwrap_or_else(|| env::patcher_state_path(&destination));
        let state = update_state(&state_path, &target).await?;

        Ok(RunReport {
            version: target,
            state,
        })
    }

    async fn prepare_destination(&self) -> Result<PathBuf, EngineError> {
        let path = &self.settings.destination;
        let prepare = async {
            fs::create_dir_all(path).await?;
            fs::canonicalize(path).await
        };
        let destination = prepare.await.map_err(|source| EngineError::Destination {
            path: path.clone(),
            source,
        })?;
        debug!("engine: destination {}", destination.display());
        Ok(destination)
    }
}

fn find_universe(catalog: &Catalog, name: &str) -> Result<VersionDescriptor, EngineError> {
    catalog
        .universe(name)
        .cloned()
        .ok_or_else(|| EngineError::UnknownUniverse(name.to_owned()))
}

/// Downloads are kept even when the state file cannot be updated.
async fn update_state(
    state_path: &Path,
    version: &VersionDescriptor,
) -> Result<StateOutcome, EngineError> {
    info!("engine: updating {} to skip verification", state_path.display());
    match StateReconciler::new(state_path).reconcile(version).await {
        Ok(()) => Ok(StateOutcome::Updated(state_path.to_path_buf())),
        Err(ReconcileError::NotFound(path)) => {
            warn!(
                "engine: unable to locate {}; update it manually or run a verify in the launcher",
                path.display()
            );
            Ok(StateOutcome::Missing(path))
        }
        Err(err) => Err(EngineError::Reconcile(err)),
    }
}
