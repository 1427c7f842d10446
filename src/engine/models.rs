use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

/// A named remote environment ("universe") and the build it currently points at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub name: String,
    pub server: String,
    pub version: String,
    pub manifest_location: String,
}

impl VersionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Two descriptors describe the same build when their manifest index matches.
    #[must_use]
    pub fn is_same_build(&self, other: &VersionDescriptor) -> bool {
        self.manifest_location == other.manifest_location
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Manifest {
    /// Informational only; never checked against the transfer.
    #[serde(rename = "byte_count_total", default)]
    pub total_bytes: u64,
    /// Informational only; may disagree with `files.len()`.
    #[serde(rename = "file_count_total", default)]
    pub total_files: u32,
    #[serde(rename = "file_list", default)]
    pub files: Vec<String>,
    #[serde(rename = "key_prefix", default)]
    pub key_prefix: String,
    #[serde(rename = "webseed_urls", default)]
    pub mirrors: Vec<String>,
}

impl Manifest {
    /// Source URL for `relative_path` on the given mirror.
    #[must_use]
    pub fn file_url(&self, mirror: &str, relative_path: &str) -> String {
        format!("{}/{}/{}", mirror, self.key_prefix, relative_path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTask {
    pub relative_path: String,
    pub destination: PathBuf,
}

impl DownloadTask {
    pub fn new(root: &Path, relative_path: &str) -> Self {
        // Entries stay below `root`: empty, `.` and `..` segments are dropped.
        let destination = relative_path
            .split(['/', '\\'])
            .filter(|part| match *part {
                "" | "." => false,
                ".." => {
                    warn!("manifest: ignoring `..` in {relative_path}");
                    false
                }
                _ => true,
            })
            .fold(root.to_path_buf(), |path, part| path.join(part));
        Self {
            relative_path: relative_path.to_owned(),
            destination,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub universes: Vec<VersionDescriptor>,
}

impl Catalog {
    pub fn universe(&self, name: &str) -> Option<&VersionDescriptor> {
        self.universes
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name))
    }
}
