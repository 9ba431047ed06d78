//! Compiler backends: turn a staged translation unit into a loadable artifact.

mod cython;
mod native_module;

use std::path::Path;

use thiserror::Error;

use cycompile_source::TranslationUnit;

use crate::profile::CompilerConfig;

pub use cython::CythonBackend;
pub use native_module::native_module_source;

/// Everything a backend needs for one build.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub unit: &'a TranslationUnit,
    /// The unit's text as staged in the cache root.
    pub unit_path: &'a Path,
    /// Where the artifact, named after the unit's file stem, must be placed.
    pub output_dir: &'a Path,
    /// Scratch space for intermediate files; removed after the build.
    pub temp_dir: &'a Path,
    pub config: &'a CompilerConfig,
    pub verbose: bool,
}

impl BuildRequest<'_> {
    pub fn stem(&self) -> &str {
        self.unit_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unit")
    }
}

/// Backend rejection, with the toolchain's diagnostics verbatim.
#[derive(Debug, Error)]
#[error("{diagnostics}")]
pub struct BackendFailure {
    pub diagnostics: String,
}

impl BackendFailure {
    pub fn new(diagnostics: impl Into<String>) -> Self {
        Self {
            diagnostics: diagnostics.into(),
        }
    }
}

pub trait CompilerBackend: Send + Sync {
    fn compile(&self, request: &BuildRequest<'_>) -> Result<(), BackendFailure>;
}
