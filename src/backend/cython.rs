use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use super::native_module::{exported_symbols, native_module_source};
use super::{BackendFailure, BuildRequest, CompilerBackend};
use crate::cache::path::ARTIFACT_EXTENSION;

/// Builds units with the `cython` translator followed by the system C
/// compiler. The artifact is a Python extension module that also exports the
/// C entry points the dynamic loader resolves, and links the interpreter so it
/// can be loaded into a process that has none.
#[derive(Debug)]
pub struct CythonBackend {
    cython: PathBuf,
    cc: PathBuf,
    python_config: PathBuf,
    includes: OnceCell<Vec<String>>,
    ldflags: OnceCell<Vec<String>>,
}

impl Default for CythonBackend {
    fn default() -> Self {
        let cc = std::env::var_os("CC").map_or_else(
            || PathBuf::from(if cfg!(target_os = "windows") { "cl" } else { "cc" }),
            PathBuf::from,
        );
        Self {
            cython: PathBuf::from("cython"),
            cc,
            python_config: PathBuf::from("python3-config"),
            includes: OnceCell::new(),
            ldflags: OnceCell::new(),
        }
    }
}

impl CythonBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(
        cython: impl Into<PathBuf>,
        cc: impl Into<PathBuf>,
        python_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cython: cython.into(),
            cc: cc.into(),
            python_config: python_config.into(),
            includes: OnceCell::new(),
            ldflags: OnceCell::new(),
        }
    }

    fn python_includes(&self) -> Result<&[String]> {
        let includes = self.includes.get_or_try_init(|| {
            let output = run_tool(&self.python_config, vec!["--includes".into()])?;
            Ok::<_, anyhow::Error>(output.split_whitespace().map(str::to_string).collect())
        })?;
        Ok(includes.as_slice())
    }

    /// `--embed` is required from Python 3.8 on; older configs reject it.
    fn python_ldflags(&self) -> Result<&[String]> {
        let ldflags = self.ldflags.get_or_try_init(|| {
            let output = run_tool(&self.python_config, vec!["--ldflags".into(), "--embed".into()])
                .or_else(|_| run_tool(&self.python_config, vec!["--ldflags".into()]))?;
            Ok::<_, anyhow::Error>(output.split_whitespace().map(str::to_string).collect())
        })?;
        Ok(ldflags.as_slice())
    }

    fn translate(&self, request: &BuildRequest<'_>, source: &Path, c_file: &Path) -> Result<String> {
        let mut args: Vec<OsString> = Vec::new();
        for (name, value) in &request.config.directives {
            args.push("-X".into());
            args.push(format!("{name}={value}").into());
        }
        args.push(source.into());
        args.push("-o".into());
        args.push(c_file.into());
        run_tool(&self.cython, args)
    }

    fn link(&self, request: &BuildRequest<'_>, c_file: &Path, artifact: &Path) -> Result<String> {
        let mut args: Vec<OsString> = Vec::new();
        if cfg!(target_os = "windows") {
            args.push("/LD".into());
            for include in self.python_includes()? {
                args.push(include.replacen("-I", "/I", 1).into());
            }
            args.extend(request.config.flags.iter().map(OsString::from));
            args.push(c_file.into());
            let mut out = OsString::from("/Fe:");
            out.push(artifact);
            args.push(out);
            args.push("/link".into());
            for symbol in exported_symbols(request.unit) {
                args.push(format!("/EXPORT:{symbol}").into());
            }
        } else {
            args.push("-shared".into());
            args.push("-fPIC".into());
            if cfg!(target_os = "macos") {
                args.push("-undefined".into());
                args.push("dynamic_lookup".into());
            }
            args.extend(self.python_includes()?.iter().map(OsString::from));
            args.extend(request.config.flags.iter().map(OsString::from));
            args.push(c_file.into());
            args.extend(self.python_ldflags()?.iter().map(OsString::from));
            args.push("-o".into());
            args.push(artifact.into());
        }
        run_tool(&self.cc, args)
    }
}

impl CompilerBackend for CythonBackend {
    fn compile(&self, request: &BuildRequest<'_>) -> Result<(), BackendFailure> {
        let stem = request.stem();
        // Cython names the module init after the file, so the stem is kept.
        let source = request.temp_dir.join(format!("{stem}.pyx"));
        let c_file = request.temp_dir.join(format!("{stem}.c"));
        let artifact = request
            .output_dir
            .join(format!("{stem}.{ARTIFACT_EXTENSION}"));

        fs::write(&source, native_module_source(request.unit))
            .map_err(|err| BackendFailure::new(format!("failed to write {}: {err}", source.display())))?;
        let translated = self
            .translate(request, &source, &c_file)
            .map_err(|err| BackendFailure::new(format!("{err:#}")))?;
        report(request.verbose, "cython", &translated);

        let linked = self
            .link(request, &c_file, &artifact)
            .map_err(|err| BackendFailure::new(format!("{err:#}")))?;
        report(request.verbose, "cc", &linked);

        Ok(())
    }
}

fn report(verbose: bool, tool: &str, output: &str) {
    if output.trim().is_empty() {
        return;
    }
    if verbose {
        info!(tool, "{}", output.trim_end());
    } else {
        debug!(tool, "{}", output.trim_end());
    }
}

/// Runs a tool to completion, returning its combined output; a non-zero exit
/// turns that output into the error.
fn run_tool(program: &Path, args: Vec<OsString>) -> Result<String> {
    let output = duct::cmd(program, args)
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .run()
        .with_context(|| format!("failed to run {}", program.display()))?;
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        bail!("{} exited with {}:\n{text}", program.display(), output.status);
    }
    Ok(text)
}
