//! Error types for the extension system.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, sandboxing or invoking extensions.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Disallowed dependency: {name}")]
    DisallowedDependency { extension: String, name: String },

    #[error("Unknown capability '{name}' requested by extension '{extension}'")]
    UnknownCapability { extension: String, name: String },

    #[error("Whitelist could not be loaded from {path}: {message}")]
    WhitelistUnavailable { path: PathBuf, message: String },

    #[error("Failed to compile extension '{extension}': {message}")]
    Compilation { extension: String, message: String },

    #[error("Extension '{extension}' failed: {message}")]
    Invocation { extension: String, message: String },

    #[error("Failed to persist record for extension '{extension}': {message}")]
    Persistence { extension: String, message: String },

    #[error("Failed to read {path}: {message}")]
    Source { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtensionError {
    /// Short label used for operator diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::DisallowedDependency { .. } | Self::UnknownCapability { .. } => "dependency",
            Self::WhitelistUnavailable { .. } => "whitelist",
            Self::Compilation { .. } => "compilation",
            Self::Invocation { .. } => "invocation",
            Self::Persistence { .. } => "persistence",
            Self::Source { .. } | Self::Io(_) => "source",
        }
    }

    /// Name of the extension the error belongs to, if any.
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::DisallowedDependency { extension, .. }
            | Self::UnknownCapability { extension, .. }
            | Self::Compilation { extension, .. }
            | Self::Invocation { extension, .. }
            | Self::Persistence { extension, .. } => Some(extension),
            _ => None,
        }
    }
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
