//! Rung - sandboxed alert extensions with a hot-reloading live preview.
//!
//! Extensions are small scripts that compute alerts. Each one runs in a
//! fresh V8 isolate whose `require` only resolves whitelisted capabilities.
//!
//! # Architecture
//!
//! The library is organized into these main modules:
//!
//! - [`extensions`] - Whitelist, sandbox, invocation protocol, persistence
//! - [`alerts`] - Alert sets assembled from extension results
//! - [`render`] - Markdown rendering of alert comments
//! - [`live`] - Hot-reload pipeline, viewer hub and preview server
//! - [`config`] - `rung.toml` loading and validation
//! - [`cli`] - `rung live`, `rung run`, `rung inspect`
//!
//! # Example
//!
//! ```ignore
//! use rung::{Config, ExtensionRunner, MemoryStore};
//!
//! let config = Config::load(root)?;
//! let mut runner = ExtensionRunner::new(root, &config, Box::new(MemoryStore::default()));
//! let alerts = runner.run_cycle().await?;
//! ```

pub mod alerts;
pub mod cli;
pub mod config;
pub mod extensions;
pub mod live;
pub mod render;

mod error;

pub use alerts::{Alert, AlertSet};
pub use config::Config;
pub use error::{RungError, RungResult};
pub use extensions::{
    ExtensionError, ExtensionResult, ExtensionRunner, JsonFileStore, MemoryStore,
    PersistenceStore, Whitelist,
};
pub use live::{ReloadPipeline, ReloadTrigger, ViewerEvent, ViewerHub};
