//! Deno ops backing the sandbox prelude.
//!
//! Extensions never call these directly: the prelude captures
//! `Deno.core.ops` in closures (`console`, `require`, `render`) and removes
//! the `Deno` global before extension code runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deno_core::{error::AnyError, op2, OpState};

use crate::render::Renderer;

use super::capabilities::{CapabilityRegistry, CapabilitySource};
use super::whitelist::Whitelist;
use super::ExtensionId;

/// Why a `require` call was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityRejection {
    /// The whitelist does not admit the name.
    Disallowed(String),
    /// The whitelist admits the name but the host has no such capability.
    Unknown(String),
}

impl fmt::Display for CapabilityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disallowed(name) => write!(f, "Disallowed dependency: {}", name),
            Self::Unknown(name) => write!(f, "Cannot find capability '{}'", name),
        }
    }
}

/// Per-invocation state stored in the isolate's `OpState`.
pub struct SandboxState {
    /// Extension identifier, attached to every log line.
    pub extension: ExtensionId,

    whitelist: Arc<Whitelist>,
    capabilities: Arc<CapabilityRegistry>,
    renderer: Arc<dyn Renderer>,

    /// Directory the `fs` capability is confined to.
    root: Option<PathBuf>,

    /// Most recent refused `require`. The extension may have caught it.
    rejection: Option<CapabilityRejection>,
}

impl SandboxState {
    pub fn new(
        extension: ExtensionId,
        whitelist: Arc<Whitelist>,
        capabilities: Arc<CapabilityRegistry>,
        renderer: Arc<dyn Renderer>,
        root: Option<PathBuf>,
    ) -> Self {
        Self {
            extension,
            whitelist,
            capabilities,
            renderer,
            root,
            rejection: None,
        }
    }

    /// Resolve a capability request through the whitelist.
    pub fn resolve(&mut self, name: &str) -> Result<CapabilitySource, CapabilityRejection> {
        let result = if !self.whitelist.is_allowed(name) {
            Err(CapabilityRejection::Disallowed(name.to_string()))
        } else {
            self.capabilities
                .get(name)
                .cloned()
                .ok_or_else(|| CapabilityRejection::Unknown(name.to_string()))
        };

        if let Err(rejection) = &result {
            self.rejection = Some(rejection.clone());
        }
        result
    }

    pub fn take_rejection(&mut self) -> Option<CapabilityRejection> {
        self.rejection.take()
    }

    pub fn render(&self, markup: &str) -> String {
        self.renderer.render(markup)
    }

    /// Read a UTF-8 file below the sandbox root.
    pub fn read_file(&self, requested: &str) -> Result<String, AnyError> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("File access is not available in this sandbox"))?;
        let path = confine(root, Path::new(requested))?;
        std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", requested, e))
    }
}

/// Resolve `requested` against `root`, refusing anything outside it.
fn confine(root: &Path, requested: &Path) -> Result<PathBuf, AnyError> {
    let root = root
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Sandbox root unavailable: {}", e))?;
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let resolved = candidate
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("Failed to resolve {}: {}", requested.display(), e))?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(anyhow::anyhow!(
            "Access to '{}' is outside the extension root",
            requested.display()
        ))
    }
}

/// Namespaced console output.
#[op2(fast)]
fn op_rung_log(state: &mut OpState, #[string] level: String, #[string] message: String) {
    let ctx = state.borrow::<SandboxState>();
    let extension = ctx.extension.as_str();
    match level.as_str() {
        "error" => tracing::error!(target: "rung::extension", extension, "{}", message),
        "warn" => tracing::warn!(target: "rung::extension", extension, "{}", message),
        "debug" => tracing::debug!(target: "rung::extension", extension, "{}", message),
        _ => tracing::info!(target: "rung::extension", extension, "{}", message),
    }
}

/// Whitelist-gated capability lookup used by `require`.
#[op2]
#[serde]
fn op_rung_require(
    state: &mut OpState,
    #[string] name: String,
) -> Result<CapabilitySource, AnyError> {
    let ctx = state.borrow_mut::<SandboxState>();
    ctx.resolve(&name)
        .map_err(|rejection| anyhow::anyhow!("{}", rejection))
}

/// Rendering hook exposed as the `render` global.
#[op2]
#[string]
fn op_rung_render(state: &mut OpState, #[string] markup: String) -> String {
    state.borrow::<SandboxState>().render(&markup)
}

/// Root-confined read used by the `fs` capability.
#[op2]
#[string]
fn op_rung_read_file(state: &mut OpState, #[string] path: String) -> Result<String, AnyError> {
    state.borrow::<SandboxState>().read_file(&path)
}

deno_core::extension!(
    rung_sandbox,
    ops = [op_rung_log, op_rung_require, op_rung_render, op_rung_read_file],
);
