use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::path::default_cache_root;
use cycompile_source::DEFAULT_EXCLUDED;

/// Upper bound on loaded artifacts kept in process.
pub const DEFAULT_MAX_LOADED: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding staged sources and built artifacts.
    pub cache_root: PathBuf,
    pub max_loaded: usize,
    /// Module and decorator names kept out of translation units.
    pub excluded_modules: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            max_loaded: DEFAULT_MAX_LOADED,
            excluded_modules: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn with_max_loaded(mut self, max_loaded: usize) -> Self {
        self.max_loaded = max_loaded;
        self
    }

    /// Defaults overridden by `CYCOMPILE_CACHE_DIR` and `CYCOMPILE_MAX_LOADED`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = env::var("CYCOMPILE_CACHE_DIR") {
            config.cache_root = PathBuf::from(root);
        }
        if let Ok(value) = env::var("CYCOMPILE_MAX_LOADED") {
            config.max_loaded = value.parse().unwrap_or(DEFAULT_MAX_LOADED);
        }
        config
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}
