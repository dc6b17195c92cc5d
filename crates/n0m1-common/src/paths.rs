//! Path helpers shared by the configuration layers.

use std::path::{Path, PathBuf};

/// Replace a leading `~` with the home directory. Paths without one, or a
/// system without a home directory, come back unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Expand `~` in both paths and anchor `path` at `base` unless it is absolute.
pub fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        expand_home(base).join(expanded)
    }
}
