use std::fmt;
use std::sync::Arc;

use cycompile_ffi::{Callable, Invoke, InvokeError, Links, Value};
use cycompile_source::SourceIntrospector;

use crate::dispatch::slot::{Slot, SlotState};
use crate::dispatch::Runtime;
use crate::error::{Error, Result};
use crate::profile::CompileOptions;

/// A function compiled on first call.
///
/// The first call resolves the slot through the runtime pipeline; later calls
/// go straight to the resolved callable.
pub struct CyFunction {
    qualname: String,
    options: CompileOptions,
    introspector: Arc<dyn SourceIntrospector>,
    /// Where compiled code looks up the siblings it calls.
    links: Links,
    runtime: Runtime,
    slot: Slot,
}

impl CyFunction {
    pub(crate) fn new(
        qualname: &str,
        options: CompileOptions,
        introspector: Arc<dyn SourceIntrospector>,
        links: Links,
        runtime: Runtime,
    ) -> Self {
        Self {
            qualname: qualname.to_string(),
            options,
            introspector,
            links,
            runtime,
            slot: Slot::new(),
        }
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn state(&self) -> SlotState {
        self.slot.state()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let callable = self.resolve()?;
        Ok(callable.invoke(args)?)
    }

    /// Runs the pipeline unless already resolved.
    pub fn resolve(&self) -> Result<&Callable> {
        self.slot.resolve_with(&self.qualname, || self.compile())
    }

    fn compile(&self) -> Result<Callable> {
        let prepared =
            self.runtime
                .prepare(self.introspector.as_ref(), &self.qualname, &self.options)?;
        self.runtime
            .materialize(&prepared, &self.links, self.options.verbose)
    }
}

impl Invoke for CyFunction {
    fn invoke(&self, args: &[Value]) -> std::result::Result<Value, InvokeError> {
        self.call(args).map_err(|err| match err {
            Error::Invoke(inner) => inner,
            other => InvokeError::Dispatch(Box::new(other)),
        })
    }
}

impl fmt::Debug for CyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyFunction")
            .field("qualname", &self.qualname)
            .field("options", &self.options)
            .field("state", &self.slot.state())
            .finish()
    }
}
