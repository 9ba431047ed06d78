//! Source analysis for compilation candidates: scope classification, module
//! outlining, call scanning and translation unit extraction.

pub mod calls;
pub mod decorators;
pub mod descriptor;
pub mod introspect;
pub mod lexer;
pub mod outline;
pub mod scope;
pub mod unit;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use calls::{CallScanner, TokenCallScanner};
pub use decorators::{strip_decorators, KEPT_DECORATORS};
pub use descriptor::{FunctionDescriptor, ModuleHandle};
pub use introspect::{FileIntrospector, SourceIntrospector};
pub use lexer::{tokenize, LexError};
pub use outline::{Declaration, DeclarationKind, ModuleOutline};
pub use scope::{classify, Classification, EnclosingScope, ScopeReason};
pub use unit::{TranslationUnit, UnitExtractor, DEFAULT_EXCLUDED};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source of `{function}` is unavailable: {reason}")]
    Introspection { function: String, reason: String },
    #[error("failed to read {}: {source}", path.display())]
    Extraction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to scan {origin}: {error}")]
    Scan {
        origin: String,
        #[source]
        error: LexError,
    },
}
