mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use common::{APP_SOURCE, FakeBackend, FakeLoader, runtime_config, scratch_dirs, temp_dir, write_module};
use cycompile::{
    CompileOptions, ErrorKind, InvokeError, Module, Profile, Runtime, ScopeReason, SlotState, Value,
};

struct Harness {
    _dir: tempfile::TempDir,
    module: Arc<Module>,
    runtime: Runtime,
    backend: FakeBackend,
    loader: FakeLoader,
}

fn harness_in(dir: tempfile::TempDir) -> Result<Harness> {
    let path = write_module(dir.path(), "app", APP_SOURCE);
    let module = Module::from_file("app", &path)?;
    let backend = FakeBackend::default();
    let loader = FakeLoader::new();
    let runtime = Runtime::new(runtime_config(dir.path()), backend.clone(), loader.clone())?;
    Ok(Harness {
        _dir: dir,
        module,
        runtime,
        backend,
        loader,
    })
}

fn harness() -> Result<Harness> {
    harness_in(common::temp_dir())
}

#[test]
fn first_call_compiles_and_later_calls_reuse_the_slot() -> Result<()> {
    let h = harness()?;
    let add = h
        .runtime
        .cycompile(&h.module, "add", CompileOptions::new(Profile::Fast).verbose(true));
    assert_eq!(add.state(), SlotState::Unresolved);

    for i in 0..5 {
        assert_eq!(add.call(&[Value::Int(i), Value::Int(2)])?, Value::Int(i + 2));
    }
    assert_eq!(add.state(), SlotState::Resolved);
    assert_eq!(h.backend.builds(), 1);
    assert_eq!(h.loader.loads(), 1);
    assert_eq!(h.runtime.stats().loaded, 1);
    Ok(())
}

#[test]
fn module_namespace_dispatches_to_the_compiled_function() -> Result<()> {
    let h = harness()?;
    h.runtime.cycompile(&h.module, "add", CompileOptions::default());

    assert_eq!(h.module.call("add", &[Value::Int(40), Value::Int(2)])?, Value::Int(42));
    assert!(matches!(
        h.module.call("helper", &[Value::Int(1)]),
        Err(InvokeError::Unbound(name)) if name == "helper"
    ));
    Ok(())
}

#[test]
fn mutually_recursive_siblings_compile_once_each() -> Result<()> {
    let h = harness()?;
    let is_even = h.runtime.cycompile(&h.module, "is_even", CompileOptions::default());
    let is_odd = h.runtime.cycompile(&h.module, "is_odd", CompileOptions::default());

    assert_eq!(is_even.call(&[Value::Int(5)])?, Value::Bool(false));
    assert_eq!(is_odd.call(&[Value::Int(7)])?, Value::Bool(true));
    assert_eq!(is_even.call(&[Value::Int(10)])?, Value::Bool(true));
    assert_eq!(h.backend.builds(), 2);
    assert_eq!(is_odd.state(), SlotState::Resolved);
    Ok(())
}

#[test]
fn class_members_and_nested_functions_are_rejected() -> Result<()> {
    let h = harness()?;

    let area = h.runtime.cycompile(&h.module, "Shape.area", CompileOptions::default());
    let err = area.call(&[]).expect_err("member");
    assert_eq!(err.kind(), ErrorKind::Scope);
    assert_eq!(err.scope_reason(), Some(ScopeReason::BoundMethodScope));

    let inner = h
        .runtime
        .cycompile(&h.module, "outer.<locals>.inner", CompileOptions::default());
    let err = inner.call(&[]).expect_err("nested");
    assert_eq!(err.scope_reason(), Some(ScopeReason::NestedScope));

    assert_eq!(area.state(), SlotState::Unresolved);
    assert_eq!(h.backend.builds(), 0);
    Ok(())
}

#[test]
fn failed_build_leaves_the_function_retryable() -> Result<()> {
    let h = harness()?;
    let add = h.runtime.cycompile(&h.module, "add", CompileOptions::default());

    h.backend.set_failing(true);
    let err = add.call(&[Value::Int(1), Value::Int(1)]).expect_err("backend fails");
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert_eq!(add.state(), SlotState::Unresolved);
    assert!(scratch_dirs(h.runtime.cache().root()).is_empty());

    h.backend.set_failing(false);
    assert_eq!(add.call(&[Value::Int(1), Value::Int(1)])?, Value::Int(2));
    assert_eq!(h.backend.builds(), 2);
    Ok(())
}

#[test]
fn panicking_build_leaves_the_function_retryable() -> Result<()> {
    let h = harness()?;
    let add = h.runtime.cycompile(&h.module, "add", CompileOptions::default());

    h.backend.panic_on_next_build();
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        add.call(&[Value::Int(1), Value::Int(1)]).map(|_| ())
    }));
    assert!(unwound.is_err());
    assert_eq!(add.state(), SlotState::Unresolved);

    assert_eq!(add.call(&[Value::Int(1), Value::Int(1)])?, Value::Int(2));
    assert_eq!(h.backend.builds(), 2);
    assert_eq!(add.state(), SlotState::Resolved);
    Ok(())
}

#[test]
fn missing_symbol_is_a_load_error() -> Result<()> {
    let h = harness()?;
    let shout = h.runtime.cycompile(&h.module, "shout", CompileOptions::default());

    let err = shout.call(&[Value::from("hi")]).expect_err("no entry point");
    assert_eq!(err.kind(), ErrorKind::Load);
    assert_eq!(shout.state(), SlotState::Unresolved);
    let prepared =
        h.runtime
            .prepare(h.module.introspector().as_ref(), "shout", &CompileOptions::default())?;
    assert_eq!(prepared.unit.siblings, vec!["helper"]);
    assert!(h.runtime.cache().lookup_on_disk(&prepared.key)?.is_some());
    Ok(())
}

#[test]
fn invoke_errors_pass_through_unwrapped() -> Result<()> {
    let h = harness()?;
    let add = h.runtime.cycompile(&h.module, "add", CompileOptions::default());

    let err = add.call(&[Value::from("x")]).expect_err("bad argument");
    assert_eq!(err.kind(), ErrorKind::Invoke);
    assert_eq!(add.state(), SlotState::Resolved);
    Ok(())
}

#[test]
fn another_runtime_reuses_artifacts_on_disk() -> Result<()> {
    let dir = temp_dir();
    let cache_root = dir.path().join("cache");
    let first = harness_in(dir)?;
    let add = first.runtime.cycompile(&first.module, "add", CompileOptions::default());
    add.call(&[Value::Int(1), Value::Int(2)])?;
    assert_eq!(first.backend.builds(), 1);

    let backend = FakeBackend::default();
    let loader = FakeLoader::new();
    let second = Runtime::new(
        cycompile::RuntimeConfig::default().with_cache_root(&cache_root),
        backend.clone(),
        loader.clone(),
    )?;
    let add = second.cycompile(&first.module, "add", CompileOptions::default());
    assert_eq!(add.call(&[Value::Int(3), Value::Int(4)])?, Value::Int(7));
    assert_eq!(backend.builds(), 0);
    assert_eq!(loader.loads(), 1);
    Ok(())
}

#[test]
fn different_options_build_separate_artifacts() -> Result<()> {
    let h = harness()?;
    let safe = h.runtime.cycompile(&h.module, "add", CompileOptions::default());
    safe.call(&[Value::Int(1), Value::Int(1)])?;
    let fast = h.runtime.cycompile(&h.module, "add", CompileOptions::new(Profile::Fast));
    fast.call(&[Value::Int(1), Value::Int(1)])?;

    assert_eq!(h.backend.builds(), 2);
    assert_eq!(h.runtime.cache().artifacts()?.len(), 2);
    Ok(())
}

#[test]
fn identical_bodies_under_different_names_build_separately() -> Result<()> {
    let h = harness()?;
    let double = h.runtime.cycompile(&h.module, "double", CompileOptions::default());
    let twice = h.runtime.cycompile(&h.module, "twice", CompileOptions::default());
    assert_eq!(double.call(&[Value::Int(4)])?, Value::Int(8));
    assert_eq!(twice.call(&[Value::Int(5)])?, Value::Int(10));

    assert_eq!(h.backend.builds(), 2);
    assert_eq!(h.runtime.cache().artifacts()?.len(), 2);
    let introspector = h.module.introspector();
    let double_key = h
        .runtime
        .prepare(introspector.as_ref(), "double", &CompileOptions::default())?
        .key;
    let twice_key = h
        .runtime
        .prepare(introspector.as_ref(), "twice", &CompileOptions::default())?
        .key;
    assert_ne!(double_key, twice_key);
    assert!(h.runtime.cache().lookup_on_disk(&double_key)?.is_some());
    assert!(h.runtime.cache().lookup_on_disk(&twice_key)?.is_some());
    Ok(())
}

#[test]
fn rewrapping_hits_the_loaded_tier_until_cleared() -> Result<()> {
    let h = harness()?;
    h.runtime
        .cycompile(&h.module, "add", CompileOptions::default())
        .call(&[Value::Int(1), Value::Int(1)])?;

    let again = h.runtime.cycompile(&h.module, "add", CompileOptions::default());
    again.call(&[Value::Int(2), Value::Int(2)])?;
    assert_eq!(h.loader.loads(), 1);

    h.runtime.clear_cache();
    assert_eq!(again.state(), SlotState::Resolved);
    assert_eq!(h.runtime.stats().loaded, 0);

    let fresh = h.runtime.cycompile(&h.module, "add", CompileOptions::default());
    fresh.call(&[Value::Int(3), Value::Int(3)])?;
    assert_eq!(h.loader.loads(), 2);
    assert_eq!(h.backend.builds(), 1);
    Ok(())
}

#[test]
fn concurrent_first_calls_build_once() -> Result<()> {
    let h = harness()?;
    let add = h.runtime.cycompile(&h.module, "add", CompileOptions::default());

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8_i64)
            .map(|i| {
                let add = Arc::clone(&add);
                scope.spawn(move || add.call(&[Value::Int(i), Value::Int(i)]))
            })
            .collect();
        for (i, handle) in (0_i64..).zip(handles) {
            let result = handle.join().expect("caller thread panicked");
            assert_eq!(result.expect("call succeeds"), Value::Int(i * 2));
        }
    });
    assert_eq!(h.backend.builds(), 1);
    assert_eq!(h.loader.loads(), 1);
    Ok(())
}
