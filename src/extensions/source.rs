//! Loading and compiling extension sources.

use std::path::{Path, PathBuf};

use super::error::{ExtensionError, ExtensionResult};
use super::ExtensionId;

/// An extension ready to be handed to the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Unique identifier.
    pub name: ExtensionId,
    /// Executable script text.
    pub source: String,
}

impl Extension {
    pub fn new(name: impl Into<ExtensionId>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Reads source files (extension scripts, whitelists, capability modules).
pub trait SourceLoader: Send + Sync {
    fn read(&self, path: &Path) -> ExtensionResult<String>;
}

/// Reads files relative to a project root.
#[derive(Debug, Clone)]
pub struct FsSourceLoader {
    root: PathBuf,
}

impl FsSourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceLoader for FsSourceLoader {
    fn read(&self, path: &Path) -> ExtensionResult<String> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full).map_err(|e| ExtensionError::Source {
            path: full,
            message: e.to_string(),
        })
    }
}

/// Converts authored source into script text the sandbox can run.
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, name: &str, source: &str) -> ExtensionResult<String>;
}

/// Compiler for plain scripts: drops a byte-order mark and blanks out a
/// leading `#!` line. Everything else is left to the engine, which reports
/// syntax errors when the sandbox is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl SourceCompiler for ScriptCompiler {
    fn compile(&self, name: &str, source: &str) -> ExtensionResult<String> {
        if source.contains('\0') {
            return Err(ExtensionError::Compilation {
                extension: name.to_string(),
                message: "source contains NUL bytes".to_string(),
            });
        }

        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        if source.starts_with("#!") {
            // Keep line numbers stable for stack traces.
            let rest = source.find('\n').map_or("", |idx| &source[idx..]);
            return Ok(format!("//{}", rest));
        }
        Ok(source.to_string())
    }
}
