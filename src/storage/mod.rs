use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::engine::models::VersionDescriptor;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Advisory: the launcher will simply re-verify the files.
    #[error("state file not found at {0}")]
    NotFound(PathBuf),
    #[error("state file {0} is not valid text")]
    Corrupt(PathBuf),
    #[error("unable to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StateKey {
    DownloadFinished,
    OldVersion,
    UniverseServer,
    FileIndex,
    Installed,
    Checking,
    Version,
}

impl StateKey {
    // Longer suffixes first; matching is exact anyway.
    const ALL: [StateKey; 7] = [
        StateKey::DownloadFinished,
        StateKey::OldVersion,
        StateKey::UniverseServer,
        StateKey::FileIndex,
        StateKey::Installed,
        StateKey::Checking,
        StateKey::Version,
    ];

    fn suffix(self) -> &'static str {
        match self {
            StateKey::DownloadFinished => "downloadFinished",
            StateKey::OldVersion => "oldVersion",
            StateKey::UniverseServer => "universeServer",
            StateKey::FileIndex => "fileIndex",
            StateKey::Installed => "installed",
            StateKey::Checking => "checking",
            StateKey::Version => "version",
        }
    }

    fn value(self, version: &VersionDescriptor) -> &str {
        match self {
            StateKey::DownloadFinished | StateKey::Installed => "true",
            StateKey::Checking => "false",
            StateKey::OldVersion | StateKey::Version => &version.version,
            StateKey::FileIndex => &version.manifest_location,
            StateKey::UniverseServer => &version.server,
        }
    }

    fn matches(self, line: &str, name: &str) -> bool {
        let key_len = name.len() + 1 + self.suffix().len();
        let Some(head) = line.get(..key_len) else {
            return false;
        };
        let Some((line_name, suffix)) = head.get(..name.len()).zip(head.get(name.len() + 1..))
        else {
            return false;
        };
        if !line_name.eq_ignore_ascii_case(name)
            || head.as_bytes()[name.len()] != b'_'
            || !suffix.eq_ignore_ascii_case(self.suffix())
        {
            return false;
        }
        // `foo_versionCheck` is not `foo_version`.
        matches!(line[key_len..].chars().next(), None | Some(' ' | '\t' | '='))
    }
}

/// Canonical replacement for `line` when it is one of the keys owned for `version.name`.
pub fn rewrite_line(line: &str, version: &VersionDescriptor) -> Option<String> {
    let key = StateKey::ALL
        .into_iter()
        .find(|key| key.matches(line, &version.name))?;
    Some(format!(
        "{}_{} = {}",
        version.name,
        key.suffix(),
        key.value(version)
    ))
}

/// Rewrite owned keys in `text`, keeping every other byte (line endings included) as-is.
pub fn reconcile_text(text: &str, version: &VersionDescriptor) -> String {
    let mut out = String::with_capacity(text.len());
    // A leading byte-order mark is kept but must not hide the first key.
    let text = match text.strip_prefix('\u{feff}') {
        Some(rest) => {
            out.push('\u{feff}');
            rest
        }
        None => text,
    };
    for raw in text.split_inclusive('\n') {
        let content = raw.trim_end_matches(['\r', '\n']);
        let ending = &raw[content.len()..];
        match rewrite_line(content, version) {
            Some(rewritten) => out.push_str(&rewritten),
            None => out.push_str(content),
        }
        out.push_str(ending);
    }
    out
}

/// Keeps the dependent launcher's state file in step with a completed download.
#[derive(Clone, Debug)]
pub struct StateReconciler {
    state_path: PathBuf,
}

impl StateReconciler {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// One read, one transform, one atomic replace. A missing file is never created.
    pub async fn reconcile(&self, version: &VersionDescriptor) -> Result<(), ReconcileError> {
        let path = &self.state_path;
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ReconcileError::NotFound(path.clone()));
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(ReconcileError::Corrupt(path.clone()));
            }
            Err(source) => {
                return Err(ReconcileError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };

        let rewritten = reconcile_text(&text, version);
        if rewritten == text {
            debug!("state: {} already current for {}", path.display(), version.name);
        }
        self.replace(rewritten.as_bytes())
            .await
            .map_err(|source| ReconcileError::Write {
                path: path.clone(),
                source,
            })?;
        info!(
            "state: {} updated for {} {}",
            path.display(),
            version.name,
            version.version
        );
        Ok(())
    }

    async fn replace(&self, contents: &[u8]) -> std::io::Result<()> {
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        let written = async {
            file.write_all(contents).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            fs::remove_file(&temp_path).await.ok();
            return Err(err);
        }
        fs::rename(&temp_path, &self.state_path).await
    }

    /// `PatcherState` -> `PatcherState.tmp`, `launcher.cfg` -> `launcher.cfg.tmp`.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .state_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.state_path.with_file_name(name)
    }
}
