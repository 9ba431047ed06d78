//! Compile-on-first-call dispatch for host functions.
//!
//! A function registered through [`Runtime::cycompile`] is extracted into a
//! standalone translation unit the first time it runs, built by a
//! [`CompilerBackend`] into an artifact keyed by a hash of its source and
//! compiler configuration, loaded, and called. Later calls skip straight to
//! the loaded callable; later processes reuse the artifact from disk.

#[macro_use]
pub mod utils;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod profile;

pub use backend::{BackendFailure, BuildRequest, CompilerBackend, CythonBackend};
pub use cache::{ArtifactCache, CacheKey, CacheStats};
pub use config::RuntimeConfig;
pub use cycompile_ffi::{
    Callable, DynamicLibraryLoader, Invoke, InvokeError, LinkTable, Links, LoadError, SymbolLoader,
    Value,
};
pub use cycompile_source::{FileIntrospector, ScopeReason, SourceError, SourceIntrospector};
pub use dispatch::{CyFunction, Module, Namespace, Prepared, Runtime, SlotState};
pub use error::{Error, ErrorKind, Result};
pub use profile::{CompileOptions, DirectiveValue, Profile};
pub use utils::logger::init_logging;
