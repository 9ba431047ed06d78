use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use cycompile_source::FileIntrospector;
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::dispatch::{Prepared, Runtime};
use crate::profile::{CompileOptions, DirectiveValue, Profile};
use crate::utils::logger;

#[derive(Parser, Debug)]
#[command(name = "cycompile", version, about = "Inspect the cycompile artifact cache")]
pub struct CycompileCli {
    #[arg(long, global = true, env = "CYCOMPILE_CACHE_DIR")]
    /// Cache root to inspect instead of the per-user default.
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl CycompileCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prints the translation unit extracted for a function.
    Unit {
        file: PathBuf,
        function: String,
        #[arg(long)]
        module: Option<String>,
    },
    /// Prints the artifact identifier a function would be built under.
    Key {
        file: PathBuf,
        function: String,
        #[arg(long)]
        module: Option<String>,
        #[arg(long, default_value = "safe")]
        profile: String,
        /// Directive override, `name=value`.
        #[arg(short = 'X', long = "directive", value_parser = parse_directive)]
        directives: Vec<(String, DirectiveValue)>,
        /// Extra compiler flag; may be repeated.
        #[arg(long = "flag", allow_hyphen_values = true)]
        flags: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Lists built artifacts in the cache root.
    Ls {
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = CycompileCli::parse();
    let mut config = RuntimeConfig::from_env();
    if let Some(root) = &cli.cache_dir {
        config.cache_root = root.clone();
    }
    let runtime = Runtime::builder(config).build()?;

    match &cli.command {
        Command::Unit {
            file,
            function,
            module,
        } => {
            let prepared = prepare(&runtime, file, module.as_deref(), function, &CompileOptions::default())?;
            println!("{}", prepared.unit);
            Ok(())
        }
        Command::Key {
            file,
            function,
            module,
            profile,
            directives,
            flags,
            json,
        } => {
            let mut options = CompileOptions::new(Profile::from_name(profile));
            for (name, value) in directives {
                options = options.directive(name.clone(), value.clone());
            }
            for flag in flags {
                options = options.flag(flag.clone());
            }
            let prepared = prepare(&runtime, file, module.as_deref(), function, &options)?;
            print_key(&runtime, &prepared, *json)
        }
        Command::Ls { json } => list_artifacts(&runtime, *json),
    }
}

fn prepare(
    runtime: &Runtime,
    file: &Path,
    module: Option<&str>,
    function: &str,
    options: &CompileOptions,
) -> Result<Prepared> {
    let module = match module {
        Some(name) => name.to_string(),
        None => file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("cannot derive a module name from {}", file.display()))?
            .to_string(),
    };
    let introspector = FileIntrospector::open(module, file)?;
    runtime
        .prepare(&introspector, function, options)
        .with_context(|| format!("failed to prepare `{function}`"))
}

fn print_key(runtime: &Runtime, prepared: &Prepared, json: bool) -> Result<()> {
    let staged = runtime.cache().staged_source_path(&prepared.key);
    let artifact = runtime.cache().lookup_on_disk(&prepared.key)?;

    if json {
        let report = json!({
            "function": prepared.descriptor.qualname,
            "key": prepared.key.as_str(),
            "fingerprint": prepared.config.fingerprint(),
            "siblings": prepared.unit.siblings,
            "staged": staged,
            "artifact": artifact,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", "key".bold(), prepared.key);
    println!("{} {}", "config".bold(), prepared.config.fingerprint());
    match artifact {
        Some(path) => println!("{} {}", "built".green().bold(), path.display()),
        None => println!("{} {}", "not built".yellow().bold(), staged.display()),
    }
    Ok(())
}

fn list_artifacts(runtime: &Runtime, json: bool) -> Result<()> {
    let artifacts = runtime.cache().artifacts()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    println!("{} {}", "cache".bold(), runtime.cache().root().display());
    if artifacts.is_empty() {
        println!("{}", "no artifacts".dimmed());
    }
    for artifact in artifacts {
        let modified = artifact
            .modified
            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>10}  {}  {}",
            artifact.size,
            modified.dimmed(),
            artifact.path.display()
        );
    }
    Ok(())
}

fn parse_directive(text: &str) -> Result<(String, DirectiveValue), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, got `{text}`"))?;
    let value = value.parse().map_err(|_| format!("invalid value `{value}`"))?;
    Ok((name.trim().to_string(), value))
}
