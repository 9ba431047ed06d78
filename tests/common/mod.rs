#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cycompile::backend::{BackendFailure, BuildRequest, CompilerBackend};
use cycompile::cache::ARTIFACT_EXTENSION;
use cycompile::{
    Callable, InvokeError, LinkTable, Links, LoadError, RuntimeConfig, SymbolLoader, Value,
};

pub const APP_SOURCE: &str = r#"import math
from collections import deque
from cycompile import cycompile


def helper(x):
    return x + 1


@cycompile(profile="fast", verbose=True)
def add(a, b):
    return a + b


@cycompile()
def is_even(n):
    if n == 0:
        return True
    return is_odd(n - 1)


@cycompile()
def is_odd(n):
    if n == 0:
        return False
    return is_even(n - 1)


@cycompile()
def shout(word):
    return word.upper() + helper(0)


@cycompile()
def double(x):
    return x * 2


@cycompile()
def twice(x):
    return x * 2


class Shape:
    @cycompile()
    def area(self):
        return 0


def outer():
    @cycompile()
    def inner():
        return 1

    return inner
"#;

pub fn temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("cycompile-test")
        .tempdir()
        .expect("failed to create temp dir")
}

pub fn write_module(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(format!("{name}.py"));
    fs::write(&path, source).expect("failed to write module");
    path
}

pub fn runtime_config(dir: &Path) -> RuntimeConfig {
    RuntimeConfig::default().with_cache_root(dir.join("cache"))
}

/// Copies the staged unit into the output directory as the "artifact".
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub builds: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub panic_once: Arc<AtomicBool>,
}

impl FakeBackend {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_next_build(&self) {
        self.panic_once.store(true, Ordering::SeqCst);
    }
}

impl CompilerBackend for FakeBackend {
    fn compile(&self, request: &BuildRequest<'_>) -> Result<(), BackendFailure> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        assert!(request.temp_dir.is_dir(), "scratch directory must exist");
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("toolchain crashed");
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendFailure::new("app.pyx:3:4: Syntax error in simple statement"));
        }

        let text = fs::read_to_string(request.unit_path)
            .map_err(|err| BackendFailure::new(err.to_string()))?;
        fs::write(
            request.temp_dir.join(format!("{}.c", request.stem())),
            "/* generated */",
        )
        .map_err(|err| BackendFailure::new(err.to_string()))?;
        fs::write(
            request
                .output_dir
                .join(format!("{}.{ARTIFACT_EXTENSION}", request.stem())),
            text,
        )
        .map_err(|err| BackendFailure::new(err.to_string()))
    }
}

/// Resolves symbols to Rust closures standing in for compiled code. Sibling
/// calls go through the links handed to the loader, the way compiled code's
/// do.
#[derive(Clone, Default)]
pub struct FakeLoader {
    pub loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, InvokeError> {
    args.get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| InvokeError::Raised(format!("argument {index} must be an int")))
}

impl SymbolLoader for FakeLoader {
    fn load(&self, artifact: &Path, symbol: &str, links: &Links) -> Result<Callable, LoadError> {
        let text = fs::read_to_string(artifact).map_err(|err| LoadError::Open {
            path: artifact.to_path_buf(),
            message: err.to_string(),
        })?;
        let missing = || LoadError::MissingSymbol {
            path: artifact.to_path_buf(),
            symbol: symbol.to_string(),
        };
        if !text.contains(&format!("def {symbol}(")) {
            return Err(missing());
        }
        self.loads.fetch_add(1, Ordering::SeqCst);

        let links = Arc::clone(links);
        let callable: Callable = match symbol {
            "add" => Arc::new(|args: &[Value]| -> Result<Value, InvokeError> {
                Ok(Value::Int(int_arg(args, 0)? + int_arg(args, 1)?))
            }),
            "is_even" => Arc::new(move |args: &[Value]| -> Result<Value, InvokeError> {
                let n = int_arg(args, 0)?;
                if n == 0 {
                    return Ok(Value::Bool(true));
                }
                links.call("is_odd", &[Value::Int(n - 1)])
            }),
            "is_odd" => Arc::new(move |args: &[Value]| -> Result<Value, InvokeError> {
                let n = int_arg(args, 0)?;
                if n == 0 {
                    return Ok(Value::Bool(false));
                }
                links.call("is_even", &[Value::Int(n - 1)])
            }),
            "double" | "twice" => Arc::new(|args: &[Value]| -> Result<Value, InvokeError> {
                Ok(Value::Int(int_arg(args, 0)? * 2))
            }),
            _ => return Err(missing()),
        };
        Ok(callable)
    }
}

pub fn scratch_dirs(root: &Path) -> Vec<PathBuf> {
    fs::read_dir(root)
        .expect("cache root must exist")
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".cybuild-"))
        })
        .collect()
}
