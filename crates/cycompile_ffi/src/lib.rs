//! Calling convention and dynamic loading for compiled artifacts.
//!
//! Everything that crosses the boundary between the dispatcher and a loaded
//! artifact lives here: the [`Value`] model, the C ABI used by native entry
//! points, and the [`SymbolLoader`] capability that turns an artifact on disk
//! into a [`Callable`].

pub mod abi;
pub mod dynamic_loader;
pub mod value;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

pub use abi::{entry_symbol, FfiKind, FfiValue, LinkCallback, NativeEntry};
pub use dynamic_loader::{DynamicLibraryLoader, NativeFunction};
pub use value::Value;

/// Something that can be invoked with the dynamic calling convention.
pub trait Invoke: Send + Sync {
    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError>;
}

impl<F> Invoke for F
where
    F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        self(args)
    }
}

/// Shared handle to a loaded (or dispatching) function.
pub type Callable = Arc<dyn Invoke>;

/// Name-based lookup of the functions an artifact's code calls.
///
/// Compiled code never links against its siblings directly; each call goes
/// through the table the loaded function was handed, so rebinding a name is
/// seen by every caller.
pub trait LinkTable: Send + Sync {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError>;
}

pub type Links = Arc<dyn LinkTable>;

/// Resolves a named function inside a built artifact. Calls the function
/// makes to its siblings are routed through `links`.
pub trait SymbolLoader: Send + Sync {
    fn load(&self, artifact: &Path, symbol: &str, links: &Links) -> Result<Callable, LoadError>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open artifact {}: {message}", path.display())]
    Open { path: PathBuf, message: String },
    #[error("symbol `{symbol}` not found in {}", path.display())]
    MissingSymbol { path: PathBuf, symbol: String },
    #[error("artifact {} failed to initialise (status {status})", path.display())]
    Init { path: PathBuf, status: i32 },
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("`{function}` expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("value of kind `{kind}` cannot cross the native boundary")]
    Unsupported { kind: &'static str },
    #[error("native entry `{symbol}` returned status {status}")]
    Native { symbol: String, status: i32 },
    #[error("no function bound to `{0}`")]
    Unbound(String),
    #[error("{0}")]
    Raised(String),
    #[error(transparent)]
    Dispatch(Box<dyn std::error::Error + Send + Sync>),
}
