use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::descriptor::{FunctionDescriptor, ModuleHandle};
use crate::outline::{Declaration, ModuleOutline};
use crate::scope::EnclosingScope;
use crate::SourceError;

/// Host capability for recovering a function's source and origin.
///
/// Functions are addressed by qualified name within the introspected module
/// (`f`, `Class.method`, `outer.<locals>.inner`).
pub trait SourceIntrospector: Send + Sync {
    fn source(&self, qualname: &str) -> Result<String, SourceError>;
    fn module(&self, qualname: &str) -> Result<ModuleHandle, SourceError>;
    fn file(&self, qualname: &str) -> Result<PathBuf, SourceError>;
    fn scope(&self, qualname: &str) -> Result<EnclosingScope, SourceError>;

    fn describe(&self, qualname: &str) -> Result<FunctionDescriptor, SourceError> {
        let name = qualname
            .rsplit('.')
            .next()
            .unwrap_or(qualname)
            .to_string();
        Ok(FunctionDescriptor {
            name,
            qualname: qualname.to_string(),
            source: self.source(qualname)?,
            scope: self.scope(qualname)?,
            module: self.module(qualname)?,
            file: self.file(qualname)?,
        })
    }
}

/// Introspects functions of a module backed by a source file.
///
/// The text is captured when the introspector is created, the same way a host
/// retains the source of functions it has already loaded.
#[derive(Debug, Clone)]
pub struct FileIntrospector {
    module: String,
    path: PathBuf,
    text: String,
    outline: ModuleOutline,
}

impl FileIntrospector {
    pub fn open(module: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let module = module.into();
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| SourceError::Introspection {
            function: module.clone(),
            reason: format!("cannot read {}: {err}", path.display()),
        })?;
        Self::from_source(module, path, text)
    }

    /// Uses `text` as the module source, e.g. a string embedded at build time.
    /// `path` must still name the file imports are read from at extraction.
    pub fn from_source(
        module: impl Into<String>,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let module = module.into();
        let text = text.into();
        let outline = ModuleOutline::parse(&text).map_err(|err| SourceError::Introspection {
            function: module.clone(),
            reason: err.to_string(),
        })?;
        debug!(module = %module, declarations = outline.declarations().len(), "outlined module");

        Ok(Self {
            module,
            path: path.into(),
            text,
            outline,
        })
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn outline(&self) -> &ModuleOutline {
        &self.outline
    }

    fn declaration(&self, qualname: &str) -> Result<&Declaration, SourceError> {
        self.outline
            .find(qualname)
            .ok_or_else(|| SourceError::Introspection {
                function: qualname.to_string(),
                reason: format!("no definition in module `{}`", self.module),
            })
    }
}

impl SourceIntrospector for FileIntrospector {
    fn source(&self, qualname: &str) -> Result<String, SourceError> {
        let declaration = self.declaration(qualname)?;
        Ok(self.outline.text_of(declaration, &self.text))
    }

    fn module(&self, qualname: &str) -> Result<ModuleHandle, SourceError> {
        self.declaration(qualname)?;
        Ok(ModuleHandle {
            name: self.module.clone(),
            declarations: self.outline.top_level_names(),
        })
    }

    fn file(&self, qualname: &str) -> Result<PathBuf, SourceError> {
        self.declaration(qualname)?;
        Ok(self.path.clone())
    }

    fn scope(&self, qualname: &str) -> Result<EnclosingScope, SourceError> {
        Ok(self.declaration(qualname)?.scope.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const APP: &str = "\
import sys

def first(x):
    return x

if sys.platform != \"win32\":
    def g(x):
        return first(x) + 1
";

    #[test]
    fn conditional_function_is_described_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("app.py");
        fs::write(&path, APP)?;

        let introspector = FileIntrospector::open("app", &path)?;
        let descriptor = introspector.describe("g")?;
        assert_eq!(descriptor.scope, EnclosingScope::Module);
        assert_eq!(descriptor.file, path);
        assert!(descriptor.source.starts_with("    def g(x):"));
        assert!(descriptor.module.declarations.contains("first"));
        assert!(descriptor.module.declarations.contains("g"));
        Ok(())
    }

    #[test]
    fn unreadable_file_is_an_introspection_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = FileIntrospector::open("gone", dir.path().join("gone.py"))
            .expect_err("file does not exist");
        assert!(matches!(err, SourceError::Introspection { .. }));
        Ok(())
    }
}
