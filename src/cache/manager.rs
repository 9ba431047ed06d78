use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use cycompile_ffi::{Callable, Links, SymbolLoader};
use cycompile_source::TranslationUnit;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{BuildRequest, CompilerBackend};
use crate::cache::key::{CacheKey, KEY_PREFIX};
use crate::cache::loaded::LoadedArtifacts;
use crate::cache::path::{ensure_structure, staged_source_path, ARTIFACT_EXTENSION};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::profile::CompilerConfig;

/// Two-tier artifact store: built artifacts on disk under a cache root, and
/// loaded callables in process.
///
/// Disk entries are never removed here. Identifiers embed a content hash, so a
/// changed function simply stops referring to its old artifact.
pub struct ArtifactCache {
    root: PathBuf,
    loaded: LoadedArtifacts,
    build_locks: Mutex<AHashMap<CacheKey, Arc<Mutex<()>>>>,
    builds: AtomicUsize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub root: PathBuf,
    pub loaded: usize,
    pub capacity: usize,
    pub builds: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl ArtifactCache {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let root = config.cache_root.clone();
        ensure_structure(&root).map_err(|err| Error::cache(&root, err))?;
        debug!("cache root initialised" = %root.display());

        Ok(Self {
            root,
            loaded: LoadedArtifacts::new(config.max_loaded),
            build_locks: Mutex::new(AHashMap::new()),
            builds: AtomicUsize::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staged_source_path(&self, key: &CacheKey) -> PathBuf {
        staged_source_path(&self.root, key.as_str())
    }

    /// First file in the cache root named `<key>*.<native extension>`.
    pub fn lookup_on_disk(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        find_artifact(&self.root, key)
    }

    pub fn lookup_loaded(&self, key: &CacheKey) -> Option<Callable> {
        self.loaded.get(key)
    }

    pub fn store(&self, key: CacheKey, callable: Callable) {
        for evicted in self.loaded.insert(key, callable) {
            debug!(evicted = %evicted, "loaded artifact evicted");
        }
    }

    /// Stages `unit`, runs `backend` in a scratch directory and moves the
    /// produced artifact into the cache root.
    ///
    /// Builds of one identifier are serialized; a build that finds the artifact
    /// already present (another thread won the race) returns it unbuilt.
    pub fn build(
        &self,
        key: &CacheKey,
        unit: &TranslationUnit,
        config: &CompilerConfig,
        backend: &dyn CompilerBackend,
        verbose: bool,
    ) -> Result<PathBuf> {
        let lock = self.build_lock(key);
        let _guard = lock.lock();

        if let Some(existing) = self.lookup_on_disk(key)? {
            debug!(artifact = %existing.display(), "artifact appeared while waiting to build");
            return Ok(existing);
        }

        let staged = self.staged_source_path(key);
        write_atomically(&self.root, &staged, unit.text().as_bytes())?;

        let scratch = tempfile::Builder::new()
            .prefix(".cybuild-")
            .tempdir_in(&self.root)
            .map_err(|err| Error::cache(&self.root, err))?;
        let output_dir = scratch.path().join("out");
        let temp_dir = scratch.path().join("tmp");
        for dir in [&output_dir, &temp_dir] {
            fs::create_dir_all(dir).map_err(|err| Error::cache(dir, err))?;
        }

        let request = BuildRequest {
            unit,
            unit_path: &staged,
            output_dir: &output_dir,
            temp_dir: &temp_dir,
            config,
            verbose,
        };

        if verbose {
            info!(
                function = %unit.function,
                profile = %config.profile,
                directives = ?config.directives,
                flags = ?config.flags,
                "compiling"
            );
        }
        let started = Instant::now();
        self.builds.fetch_add(1, Ordering::Relaxed);
        backend
            .compile(&request)
            .map_err(|failure| Error::Compile {
                function: unit.function.clone(),
                diagnostics: failure.diagnostics,
            })?;

        let produced = find_artifact(&output_dir, key)?.ok_or_else(|| Error::Compile {
            function: unit.function.clone(),
            diagnostics: format!(
                "backend reported success but produced no `{key}*.{ARTIFACT_EXTENSION}` artifact"
            ),
        })?;
        let file_name = produced
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{key}.{ARTIFACT_EXTENSION}")));
        let destination = self.root.join(file_name);
        fs::rename(&produced, &destination).map_err(|err| Error::cache(&destination, err))?;

        let elapsed = started.elapsed();
        progress!(verbose, function = %unit.function, ?elapsed, artifact = %destination.display(), "compiled");

        if let Err(err) = scratch.close() {
            warn!(error = %err, "failed to remove build directory");
        }
        Ok(destination)
    }

    pub fn load(
        &self,
        artifact: &Path,
        symbol: &str,
        loader: &dyn SymbolLoader,
        links: &Links,
    ) -> Result<Callable> {
        loader.load(artifact, symbol, links).map_err(|source| Error::Load {
            function: symbol.to_string(),
            source,
        })
    }

    /// Empties the in-process tier; artifacts on disk are kept.
    pub fn clear_loaded(&self) {
        self.loaded.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            root: self.root.clone(),
            loaded: self.loaded.len(),
            capacity: self.loaded.capacity(),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }

    /// Every artifact this system has built into the cache root.
    pub fn artifacts(&self) -> Result<Vec<ArtifactInfo>> {
        let pattern = glob_pattern(&self.root, KEY_PREFIX);
        let paths = glob::glob(&pattern).map_err(|err| {
            Error::cache(&self.root, io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;

        let mut artifacts = Vec::new();
        for path in paths.flatten() {
            let metadata = fs::metadata(&path).map_err(|err| Error::cache(&path, err))?;
            if !metadata.is_file() {
                continue;
            }
            artifacts.push(ArtifactInfo {
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }
        Ok(artifacts)
    }

    fn build_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock();
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}

fn glob_pattern(dir: &Path, stem_prefix: &str) -> String {
    format!(
        "{}{MAIN_SEPARATOR}{stem_prefix}*.{ARTIFACT_EXTENSION}",
        glob::Pattern::escape(&dir.to_string_lossy())
    )
}

fn find_artifact(dir: &Path, key: &CacheKey) -> Result<Option<PathBuf>> {
    let pattern = glob_pattern(dir, key.as_str());
    let paths = glob::glob(&pattern)
        .map_err(|err| Error::cache(dir, io::Error::new(io::ErrorKind::InvalidInput, err)))?;
    Ok(paths.flatten().find(|path| path.is_file()))
}

fn write_atomically(dir: &Path, destination: &Path, contents: &[u8]) -> Result<()> {
    let mut staging =
        tempfile::NamedTempFile::new_in(dir).map_err(|err| Error::cache(dir, err))?;
    staging
        .write_all(contents)
        .map_err(|err| Error::cache(staging.path(), err))?;
    staging
        .persist(destination)
        .map_err(|err| Error::cache(destination, err.error))?;
    Ok(())
}
