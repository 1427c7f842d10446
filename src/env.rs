use std::env;
use std::path::{Path, PathBuf};

/// Catalog of universes published for the game launcher.
pub const DEFAULT_CATALOG_URL: &str = "http://manifest.robertsspaceindustries.com/Launcher/_LauncherInfo";

pub fn current_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// The launcher keeps its state two levels above the game directory:
/// `<root>/<game>/<universe>` pairs with `<root>/Patcher/PatcherState`.
pub fn patcher_state_path(destination: &Path) -> PathBuf {
    destination
        .ancestors()
        .nth(2)
        .unwrap_or(destination)
        .join("Patcher")
        .join("PatcherState")
}

/// Universe names follow the directory the files are installed into.
pub fn universe_from_dir(destination: &Path) -> Option<String> {
    destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
