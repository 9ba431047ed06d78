use std::sync::{Arc, Weak};

use ahash::AHashMap;
use cycompile_ffi::{Callable, InvokeError, LinkTable, Links, Value};
use parking_lot::RwLock;

/// Name bindings of one module.
///
/// Compiled code reaches its siblings through these bindings rather than by
/// symbol, so a sibling that has not been compiled yet is still callable and
/// compiles on its own first call.
#[derive(Default)]
pub struct Namespace {
    bindings: RwLock<AHashMap<String, Callable>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebinds `name` in place, returning the previous binding.
    pub fn bind(&self, name: impl Into<String>, callable: Callable) -> Option<Callable> {
        self.bindings.write().insert(name.into(), callable)
    }

    pub fn get(&self, name: &str) -> Option<Callable> {
        self.bindings.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        // The lock is released before the callee runs; it may call back in.
        let callable = self
            .get(name)
            .ok_or_else(|| InvokeError::Unbound(name.to_string()))?;
        callable.invoke(args)
    }
}

impl LinkTable for Namespace {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        Namespace::call(self, name, args)
    }
}

/// Link table of a namespace that does not keep it alive; functions bound in
/// a namespace hold one of these.
struct NamespaceLinks(Weak<Namespace>);

impl LinkTable for NamespaceLinks {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, InvokeError> {
        let namespace = self
            .0
            .upgrade()
            .ok_or_else(|| InvokeError::Unbound(name.to_string()))?;
        namespace.call(name, args)
    }
}

pub(crate) fn weak_links(namespace: &Arc<Namespace>) -> Links {
    Arc::new(NamespaceLinks(Arc::downgrade(namespace)))
}
