//! Extension runtime for Rung.
//!
//! Extensions are CommonJS-style scripts that export an `extension` entry
//! point. Each invocation runs in its own V8 isolate with a restricted
//! module system.
//!
//! # Architecture
//!
//! ```text
//! ExtensionRunner
//! ├── SourceLoader / SourceCompiler   (read + compile each cycle)
//! ├── Whitelist                       (loaded once, fail-closed)
//! ├── CapabilityRegistry              (built-ins + configured modules)
//! ├── Sandbox ── build() ──> ExecutionHandle (fresh JsRuntime)
//! │     └── rung_sandbox ops: log, require, render, read_file
//! └── PersistenceStore                (db record per extension)
//! ```
//!
//! A cycle runs every extension in declared order: build the sandbox, call
//! the entry point (sync or callback style), apply the `db` directive and
//! collect the alerts.

pub mod capabilities;
mod error;
pub mod invoke;
mod ops;
mod runner;
pub mod sandbox;
pub mod source;
pub mod storage;
pub mod whitelist;

pub use capabilities::{CapabilityRegistry, CapabilitySource};
pub use error::{ExtensionError, ExtensionResult};
pub use invoke::{invoke, read_config, ExtensionStyle, InvocationResult};
pub use runner::ExtensionRunner;
pub use sandbox::{Bindings, ExecutionHandle, Sandbox};
pub use source::{Extension, FsSourceLoader, ScriptCompiler, SourceCompiler, SourceLoader};
pub use storage::{apply_persistence, JsonFileStore, MemoryStore, PersistenceStore};
pub use whitelist::{is_allowed, Whitelist};

/// Unique identifier for an extension.
pub type ExtensionId = String;
