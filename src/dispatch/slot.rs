use std::cell::Cell;

use cycompile_ffi::Callable;
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    Unresolved,
    Resolving,
    Resolved,
}

/// Lazily resolved callable of one compiled function.
///
/// Resolves at most once; a failed resolution leaves the slot unresolved so the
/// next call runs the pipeline again. The gate is only held while resolving,
/// never while the resolved callable runs.
#[derive(Default)]
pub struct Slot {
    resolved: OnceCell<Callable>,
    gate: ReentrantMutex<Cell<bool>>,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&Callable> {
        self.resolved.get()
    }

    pub fn state(&self) -> SlotState {
        if self.resolved.get().is_some() {
            return SlotState::Resolved;
        }
        match self.gate.try_lock() {
            Some(resolving) if !resolving.get() => SlotState::Unresolved,
            _ => SlotState::Resolving,
        }
    }

    pub fn resolve_with(
        &self,
        function: &str,
        resolve: impl FnOnce() -> Result<Callable>,
    ) -> Result<&Callable> {
        if let Some(callable) = self.resolved.get() {
            return Ok(callable);
        }

        let resolving = self.gate.lock();
        // Another thread may have finished while this one waited.
        if let Some(callable) = self.resolved.get() {
            return Ok(callable);
        }
        if resolving.get() {
            return Err(Error::Reentrant {
                function: function.to_string(),
            });
        }

        let outcome = {
            let _flag = ResolvingFlag::raise(&resolving);
            resolve()
        };

        let callable = outcome?;
        Ok(self.resolved.get_or_init(|| callable))
    }
}

/// Marks a slot as resolving until dropped, including during unwinding, so a
/// panicking pipeline leaves the slot retryable.
struct ResolvingFlag<'a>(&'a Cell<bool>);

impl<'a> ResolvingFlag<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ResolvingFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
