use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// Extension of loadable artifacts on this platform.
pub const ARTIFACT_EXTENSION: &str = if cfg!(target_os = "windows") {
    "pyd"
} else {
    "so"
};

/// Extension of staged translation units.
pub const STAGED_EXTENSION: &str = "pyx";

pub fn default_cache_root() -> PathBuf {
    match BaseDirs::new() {
        Some(dirs) => dirs.cache_dir().join("cycompile"),
        None => std::env::temp_dir().join("cycompile"),
    }
}

pub fn staged_source_path(root: &Path, stem: &str) -> PathBuf {
    root.join(format!("{stem}.{STAGED_EXTENSION}"))
}

pub fn ensure_structure(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)
}
