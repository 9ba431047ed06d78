use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::FunctionDescriptor;

/// Lexical scope a function was declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EnclosingScope {
    Module,
    Class { name: String },
    Function { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeReason {
    /// Declared inside a class body (instance, class-bound or static members).
    BoundMethodScope,
    /// Declared inside another function body.
    NestedScope,
}

impl fmt::Display for ScopeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeReason::BoundMethodScope => {
                f.write_str("functions declared in a class body cannot be compiled standalone")
            }
            ScopeReason::NestedScope => {
                f.write_str("functions nested in another function cannot be compiled standalone")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Eligible,
    Rejected(ScopeReason),
}

/// Only module-level free functions can be extracted into a translation unit;
/// members would need their class and nested functions their closure.
pub fn classify(descriptor: &FunctionDescriptor) -> Classification {
    match descriptor.scope {
        EnclosingScope::Module => Classification::Eligible,
        EnclosingScope::Class { .. } => Classification::Rejected(ScopeReason::BoundMethodScope),
        EnclosingScope::Function { .. } => Classification::Rejected(ScopeReason::NestedScope),
    }
}
