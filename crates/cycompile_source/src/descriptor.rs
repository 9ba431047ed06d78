use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scope::EnclosingScope;

/// The module a function belongs to, as far as extraction needs to know it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHandle {
    pub name: String,
    /// Functions and classes declared at the module's top level.
    pub declarations: BTreeSet<String>,
}

/// Everything captured about a compilation candidate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub qualname: String,
    /// Literal source, decorators included.
    pub source: String,
    pub scope: EnclosingScope,
    pub module: ModuleHandle,
    pub file: PathBuf,
}
