use std::io;
use std::path::PathBuf;

use cycompile_ffi::{InvokeError, LoadError};
use cycompile_source::{ScopeReason, SourceError};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced to the caller of a compiled function.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot compile `{function}`: {reason}")]
    Scope {
        function: String,
        reason: ScopeReason,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("compilation of `{function}` failed:\n{diagnostics}")]
    Compile {
        function: String,
        diagnostics: String,
    },
    #[error("failed to load `{function}`: {source}")]
    Load {
        function: String,
        #[source]
        source: LoadError,
    },
    #[error("cache i/o failed at {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{function}` was called again while it was still being compiled")]
    Reentrant { function: String },
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Coarse classification of [`Error`], mirroring how callers react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Scope,
    Introspection,
    Extraction,
    Compile,
    Load,
    Cache,
    Reentrant,
    Invoke,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Scope { .. } => ErrorKind::Scope,
            Error::Source(SourceError::Introspection { .. }) => ErrorKind::Introspection,
            Error::Source(SourceError::Extraction { .. } | SourceError::Scan { .. }) => {
                ErrorKind::Extraction
            }
            Error::Compile { .. } => ErrorKind::Compile,
            Error::Load { .. } => ErrorKind::Load,
            Error::Cache { .. } => ErrorKind::Cache,
            Error::Reentrant { .. } => ErrorKind::Reentrant,
            Error::Invoke(_) => ErrorKind::Invoke,
        }
    }

    pub fn scope_reason(&self) -> Option<ScopeReason> {
        match self {
            Error::Scope { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether calling again can succeed without changing source or options.
    /// Only I/O conditions qualify; everything else fails deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Source(SourceError::Extraction { .. }) | Error::Cache { .. }
        )
    }

    pub(crate) fn cache(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Cache {
            path: path.into(),
            source,
        }
    }
}
