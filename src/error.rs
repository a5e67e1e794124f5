//! Error types for Rung
//!
//! Extension failures keep their own [`ExtensionError`] so callers can
//! report the failure category; everything else is a [`RungError`].

use thiserror::Error;

use crate::extensions::ExtensionError;

/// Errors that can occur in Rung
#[derive(Debug, Error)]
pub enum RungError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extension loading or execution errors
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// Live preview server errors
    #[error("Server error: {0}")]
    Server(String),

    /// File watcher errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Rung operations
pub type RungResult<T> = Result<T, RungError>;
