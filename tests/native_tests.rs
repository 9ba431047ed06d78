mod common;

use anyhow::Result;
use common::{runtime_config, temp_dir, write_module};
use cycompile::{CompileOptions, Module, Runtime, SlotState, Value};

const PARITY_SOURCE: &str = r#"import math
from cycompile import cycompile


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


@cycompile(profile="fast")
def hypot(a, b):
    return math.sqrt(a * a + b * b)
"#;

fn tool_available(program: &str, arg: &str) -> bool {
    duct::cmd(program, [arg])
        .stdout_null()
        .stderr_null()
        .unchecked()
        .run()
        .is_ok_and(|output| output.status.success())
}

/// Builds need `cython`, a C compiler and a Python with development files.
fn toolchain_available() -> bool {
    let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    tool_available("cython", "--version")
        && tool_available(&cc, "--version")
        && tool_available("python3-config", "--includes")
}

#[test]
fn cython_artifacts_load_and_call_siblings_by_name() -> Result<()> {
    if !toolchain_available() {
        eprintln!("skipping: cython toolchain not found");
        return Ok(());
    }

    let dir = temp_dir();
    let path = write_module(dir.path(), "parity", PARITY_SOURCE);
    let module = Module::from_file("parity", &path)?;
    let runtime = Runtime::builder(runtime_config(dir.path())).build()?;

    let is_even = runtime.cycompile(&module, "is_even", CompileOptions::default());
    let is_odd = runtime.cycompile(&module, "is_odd", CompileOptions::default());
    let hypot = runtime.cycompile(&module, "hypot", CompileOptions::default());

    assert_eq!(is_even.call(&[Value::Int(10)])?, Value::Bool(true));
    assert_eq!(is_odd.state(), SlotState::Resolved);
    assert_eq!(module.call("is_odd", &[Value::Int(7)])?, Value::Bool(true));
    assert_eq!(hypot.call(&[Value::Float(3.0), Value::Float(4.0)])?, Value::Float(5.0));
    assert_eq!(runtime.stats().builds, 3);
    Ok(())
}
