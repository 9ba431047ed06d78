use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::slice;
use std::sync::Arc;

use ahash::AHashMap;
use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::abi::{entry_symbol, FfiValue, InitEntry, NativeEntry, INIT_SYMBOL};
use crate::value::Value;
use crate::{Callable, Invoke, InvokeError, LoadError, Links, SymbolLoader};

/// Entry point resolved from a shared library.
pub struct NativeFunction {
    symbol: String,
    entry: NativeEntry,
    links: Links,
    // Keeps the code pages mapped for as long as `entry` is reachable.
    _library: Arc<Library>,
}

impl NativeFunction {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Invoke for NativeFunction {
    fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        call_entry(self.entry, &self.symbol, &self.links, args)
    }
}

fn call_entry(
    entry: NativeEntry,
    symbol: &str,
    links: &Links,
    args: &[Value],
) -> Result<Value, InvokeError> {
    let argv = args
        .iter()
        .map(FfiValue::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = FfiValue::NONE;
    let ctx = std::ptr::from_ref(links).cast::<c_void>();

    // SAFETY: `entry` follows `NativeEntry`; every pointer handed over, `ctx`
    // included, stays valid until it returns.
    let status = unsafe { entry(argv.as_ptr(), argv.len(), &mut out, link_trampoline, ctx) };
    if status != 0 {
        return Err(InvokeError::Native {
            symbol: symbol.to_string(),
            status,
        });
    }
    Ok(out.into_value())
}

/// Routes a sibling call from native code into the link table behind `ctx`.
/// Returns 1 when the call fails and 2 when it panics.
unsafe extern "C" fn link_trampoline(
    ctx: *const c_void,
    name: *const c_char,
    argv: *const FfiValue,
    argc: usize,
    out: *mut FfiValue,
) -> i32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `ctx` is the `&Links` passed by `call_entry`, which is still
        // on the stack; native code hands back a NUL-terminated name and
        // `argc` values.
        let links = unsafe { &*ctx.cast::<Links>() };
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
        let args: Vec<Value> = if argc == 0 {
            Vec::new()
        } else {
            unsafe { slice::from_raw_parts(argv, argc) }
                .iter()
                .map(|value| value.into_value())
                .collect()
        };

        let result = links
            .call(&name, &args)
            .and_then(|value| FfiValue::try_from(&value));
        match result {
            Ok(value) => {
                // SAFETY: `out` points at a value owned by the native caller.
                unsafe { out.write(value) };
                0
            }
            Err(err) => {
                warn!(function = %name, error = %err, "sibling call from native code failed");
                1
            }
        }
    }));
    outcome.unwrap_or(2)
}

/// Loads artifacts with the platform's dynamic linker.
///
/// A library is opened once per path and shared by every symbol resolved from
/// it. Its initialiser, when exported, runs right after the first open.
#[derive(Default)]
pub struct DynamicLibraryLoader {
    libraries: Mutex<AHashMap<PathBuf, Arc<Library>>>,
}

impl DynamicLibraryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, artifact: &Path) -> Result<Arc<Library>, LoadError> {
        let mut libraries = self.libraries.lock();
        if let Some(existing) = libraries.get(artifact) {
            return Ok(Arc::clone(existing));
        }

        let library = open_library(artifact).map_err(|err| LoadError::Open {
            path: artifact.to_path_buf(),
            message: err.to_string(),
        })?;
        debug!("opened artifact" = %artifact.display());
        // Initialisers share one embedded interpreter; the lock serializes them.
        initialise(&library, artifact)?;

        let library = Arc::new(library);
        libraries.insert(artifact.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }
}

/// Symbols are made global so extension modules the artifact imports can
/// resolve the interpreter it links.
#[cfg(unix)]
fn open_library(artifact: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // SAFETY: artifacts are produced by the compiler backend for this cache;
    // their initialisers are trusted the same way the backend is.
    unsafe { UnixLibrary::open(Some(artifact), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_library(artifact: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: as above.
    unsafe { Library::new(artifact) }
}

fn initialise(library: &Library, artifact: &Path) -> Result<(), LoadError> {
    // SAFETY: `INIT_SYMBOL` follows `InitEntry` in artifacts built for this
    // cache.
    let Ok(init) = (unsafe { library.get::<InitEntry>(INIT_SYMBOL.as_bytes()) }).map(|symbol| *symbol)
    else {
        return Ok(());
    };

    let open_error = |message: &str| LoadError::Open {
        path: artifact.to_path_buf(),
        message: message.to_string(),
    };
    let directory = artifact
        .parent()
        .map(|dir| CString::new(dir.as_os_str().as_encoded_bytes()))
        .transpose()
        .map_err(|_| open_error("artifact directory contains a NUL byte"))?
        .unwrap_or_default();
    let module = artifact
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| CString::new(stem).ok())
        .ok_or_else(|| open_error("artifact has no usable module name"))?;

    // SAFETY: both strings outlive the call.
    let status = unsafe { init(directory.as_ptr(), module.as_ptr()) };
    if status != 0 {
        return Err(LoadError::Init {
            path: artifact.to_path_buf(),
            status,
        });
    }
    Ok(())
}

impl SymbolLoader for DynamicLibraryLoader {
    fn load(&self, artifact: &Path, symbol: &str, links: &Links) -> Result<Callable, LoadError> {
        let library = self.open(artifact)?;

        // SAFETY: entry points exported for this cache follow `NativeEntry`.
        let entry = unsafe { library.get::<NativeEntry>(entry_symbol(symbol).as_bytes()) }
            .map(|resolved| *resolved)
            .map_err(|_| LoadError::MissingSymbol {
                path: artifact.to_path_buf(),
                symbol: symbol.to_string(),
            })?;

        Ok(Arc::new(NativeFunction {
            symbol: symbol.to_string(),
            entry,
            links: Arc::clone(links),
            _library: library,
        }))
    }
}
