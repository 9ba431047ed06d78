//! Runtime dispatch: compiled functions, their module namespaces and the
//! service object that owns the cache, backend and loader.

mod function;
mod namespace;
mod slot;

use std::path::Path;
use std::sync::Arc;

use cycompile_ffi::{Callable, DynamicLibraryLoader, InvokeError, Links, SymbolLoader, Value};
use cycompile_source::{
    classify, CallScanner, Classification, FileIntrospector, FunctionDescriptor,
    SourceIntrospector, TranslationUnit, UnitExtractor,
};
use tracing::debug;

use crate::backend::{CompilerBackend, CythonBackend};
use crate::cache::{compute_key, ArtifactCache, CacheKey, CacheStats};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::profile::{CompileOptions, CompilerConfig};

pub use function::CyFunction;
pub use namespace::Namespace;
pub use slot::{Slot, SlotState};

/// A host module: where function source comes from, and the bindings its
/// functions use to call each other.
pub struct Module {
    introspector: Arc<dyn SourceIntrospector>,
    namespace: Arc<Namespace>,
}

impl Module {
    pub fn new(introspector: impl SourceIntrospector + 'static) -> Arc<Self> {
        Arc::new(Self {
            introspector: Arc::new(introspector),
            namespace: Arc::new(Namespace::new()),
        })
    }

    pub fn from_file(name: &str, path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Ok(Self::new(FileIntrospector::open(name, path)?))
    }

    pub fn introspector(&self) -> &Arc<dyn SourceIntrospector> {
        &self.introspector
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub fn call(&self, name: &str, args: &[Value]) -> std::result::Result<Value, InvokeError> {
        self.namespace.call(name, args)
    }
}

/// Everything derived from a function before anything is built.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub descriptor: FunctionDescriptor,
    pub unit: TranslationUnit,
    pub config: CompilerConfig,
    pub key: CacheKey,
}

pub(crate) struct RuntimeCore {
    cache: ArtifactCache,
    backend: Arc<dyn CompilerBackend>,
    loader: Arc<dyn SymbolLoader>,
    extractor: UnitExtractor,
}

/// Shared compilation runtime. Cloning is cheap; clones share one cache.
#[derive(Clone)]
pub struct Runtime {
    core: Arc<RuntimeCore>,
}

pub struct RuntimeBuilder {
    config: RuntimeConfig,
    backend: Option<Arc<dyn CompilerBackend>>,
    loader: Option<Arc<dyn SymbolLoader>>,
    scanner: Option<Arc<dyn CallScanner>>,
}

impl RuntimeBuilder {
    pub fn backend(mut self, backend: impl CompilerBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    pub fn loader(mut self, loader: impl SymbolLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn call_scanner(mut self, scanner: impl CallScanner + 'static) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }

    /// Missing pieces default to the Cython backend and the dynamic library
    /// loader.
    pub fn build(self) -> Result<Runtime> {
        let cache = ArtifactCache::new(&self.config)?;
        let mut extractor = UnitExtractor::new().with_excluded(self.config.excluded_modules);
        if let Some(scanner) = self.scanner {
            extractor = extractor.with_scanner(scanner);
        }

        Ok(Runtime {
            core: Arc::new(RuntimeCore {
                cache,
                backend: self
                    .backend
                    .unwrap_or_else(|| Arc::new(CythonBackend::new())),
                loader: self
                    .loader
                    .unwrap_or_else(|| Arc::new(DynamicLibraryLoader::new())),
                extractor,
            }),
        })
    }
}

impl Runtime {
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            backend: None,
            loader: None,
            scanner: None,
        }
    }

    pub fn new(
        config: RuntimeConfig,
        backend: impl CompilerBackend + 'static,
        loader: impl SymbolLoader + 'static,
    ) -> Result<Self> {
        Self::builder(config).backend(backend).loader(loader).build()
    }

    /// Cython backend and dynamic library loader, configured from the
    /// environment.
    pub fn native() -> Result<Self> {
        Self::builder(RuntimeConfig::from_env()).build()
    }

    /// Wraps `qualname` of `module` in a dispatching function and binds it into
    /// the module namespace, replacing whatever was bound there. Nothing is
    /// compiled until the first call.
    pub fn cycompile(
        &self,
        module: &Arc<Module>,
        qualname: &str,
        options: CompileOptions,
    ) -> Arc<CyFunction> {
        let function = Arc::new(CyFunction::new(
            qualname,
            options,
            Arc::clone(&module.introspector),
            namespace::weak_links(&module.namespace),
            self.clone(),
        ));
        let callable: Callable = function.clone();
        module.namespace.bind(qualname, callable);
        debug!(function = qualname, "registered for compilation");
        function
    }

    /// Scope check, extraction, option resolution and identifier derivation.
    pub fn prepare(
        &self,
        introspector: &dyn SourceIntrospector,
        qualname: &str,
        options: &CompileOptions,
    ) -> Result<Prepared> {
        let descriptor = introspector.describe(qualname)?;
        if let Classification::Rejected(reason) = classify(&descriptor) {
            return Err(Error::Scope {
                function: descriptor.qualname,
                reason,
            });
        }

        let unit = self.core.extractor.extract(&descriptor)?;
        let config = options.resolve();
        let key = compute_key(&unit, &config);
        Ok(Prepared {
            descriptor,
            unit,
            config,
            key,
        })
    }

    /// Builds (or finds on disk) and loads the artifact for `prepared`; the
    /// loaded code calls its siblings through `links`.
    pub(crate) fn materialize(
        &self,
        prepared: &Prepared,
        links: &Links,
        verbose: bool,
    ) -> Result<Callable> {
        let core = &self.core;
        let name = &prepared.descriptor.qualname;
        if let Some(callable) = core.cache.lookup_loaded(&prepared.key) {
            progress!(verbose, function = %name, key = %prepared.key, "using artifact loaded earlier in this session");
            return Ok(callable);
        }

        let artifact = match core.cache.lookup_on_disk(&prepared.key)? {
            Some(path) => {
                progress!(verbose, function = %name, artifact = %path.display(), "using cached artifact");
                path
            }
            None => core.cache.build(
                &prepared.key,
                &prepared.unit,
                &prepared.config,
                core.backend.as_ref(),
                verbose,
            )?,
        };

        let callable =
            core.cache
                .load(&artifact, &prepared.descriptor.name, core.loader.as_ref(), links)?;
        core.cache.store(prepared.key.clone(), Arc::clone(&callable));
        Ok(callable)
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.core.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.core.cache.stats()
    }

    /// Drops every loaded artifact held by this runtime. Functions already
    /// resolved keep their callables; disk artifacts are untouched.
    pub fn clear_cache(&self) {
        self.core.cache.clear_loaded();
        debug!("in-process cache cleared");
    }
}
