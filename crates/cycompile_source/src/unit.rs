use std::fmt;
use std::fs;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calls::{CallScanner, TokenCallScanner};
use crate::decorators::{strip_decorators, KEPT_DECORATORS};
use crate::descriptor::FunctionDescriptor;
use crate::outline::ModuleOutline;
use crate::SourceError;

/// Module and decorator names of this system; import lines and calls that
/// mention them never reach a translation unit.
pub const DEFAULT_EXCLUDED: &[&str] = &["cythonize_decorator", "cycompile"];

/// Standalone source submitted to the compiler backend for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub function: String,
    pub module: String,
    pub imports: Vec<String>,
    /// Sibling declarations the body calls, sorted.
    pub siblings: Vec<String>,
    pub body: String,
}

impl TranslationUnit {
    pub fn sibling_imports(&self) -> Vec<String> {
        self.siblings
            .iter()
            .map(|name| format!("from {} import {name}", self.module))
            .collect()
    }

    pub fn text(&self) -> String {
        format!(
            "{}\n{}\n\n{}",
            self.imports.join("\n"),
            self.sibling_imports().join("\n"),
            self.body
        )
    }
}

impl fmt::Display for TranslationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[derive(Clone)]
pub struct UnitExtractor {
    scanner: Arc<dyn CallScanner>,
    excluded: Vec<String>,
    kept_decorators: Vec<String>,
}

impl Default for UnitExtractor {
    fn default() -> Self {
        Self {
            scanner: Arc::new(TokenCallScanner),
            excluded: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect(),
            kept_decorators: KEPT_DECORATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UnitExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn CallScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_excluded(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded;
        self
    }

    fn is_excluded(&self, text: &str) -> bool {
        self.excluded.iter().any(|name| text.contains(name.as_str()))
    }

    pub fn extract(&self, descriptor: &FunctionDescriptor) -> Result<TranslationUnit, SourceError> {
        let keep: Vec<&str> = self.kept_decorators.iter().map(String::as_str).collect();
        let body = dedent(&strip_decorators(&descriptor.source, &keep));

        let called = self
            .scanner
            .called_names(&descriptor.source)
            .map_err(|error| SourceError::Scan {
                origin: descriptor.qualname.clone(),
                error,
            })?;
        let siblings: Vec<String> = called
            .into_iter()
            .filter(|name| name != &descriptor.name)
            .filter(|name| descriptor.module.declarations.contains(name))
            .filter(|name| !self.excluded.contains(name))
            .collect();

        let file_text =
            fs::read_to_string(&descriptor.file).map_err(|source| SourceError::Extraction {
                path: descriptor.file.clone(),
                source,
            })?;
        let outline = ModuleOutline::parse(&file_text).map_err(|error| SourceError::Scan {
            origin: descriptor.file.display().to_string(),
            error,
        })?;
        let imports: Vec<String> = outline
            .import_statements(&file_text)
            .into_iter()
            .filter(|line| !self.is_excluded(line))
            .collect();

        debug!(
            function = %descriptor.qualname,
            imports = imports.len(),
            siblings = ?siblings,
            "extracted translation unit"
        );

        Ok(TranslationUnit {
            function: descriptor.name.clone(),
            module: descriptor.module.name.clone(),
            imports,
            siblings,
            body,
        })
    }
}

/// Removes the indentation common to every non-blank line, so a function
/// defined inside an `if` or `try` block becomes a module-level definition.
fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(margin..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}
