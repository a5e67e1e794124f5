//! Extension invocation protocol.
//!
//! An extension exports `module.exports.extension`. Its declared parameter
//! count decides how it is called:
//!
//! - `extension(context)` returns the result (possibly a promise);
//! - `extension(context, complete)` reports the result through `complete`.
//!
//! The style is read once, right after the source is loaded, and both paths
//! settle into the same [`InvocationResult`].

use serde_json::Value;

use super::error::{ExtensionError, ExtensionResult};
use super::sandbox::{js_literal, Bindings, ExecutionHandle, Sandbox};
use super::source::Extension;

/// How an entry point delivers its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStyle {
    /// `(context) => value`
    Sync,
    /// `(context, complete) => void`
    Callback,
}

impl ExtensionStyle {
    /// More than one declared parameter means callback style.
    pub fn from_arity(arity: u64) -> Self {
        if arity > 1 {
            Self::Callback
        } else {
            Self::Sync
        }
    }
}

/// Raw value produced by an entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub value: Value,
}

impl InvocationResult {
    /// The persistence directive, if the result carries a `db` field.
    pub fn db(&self) -> Option<&Value> {
        self.value.as_object().and_then(|fields| fields.get("db"))
    }
}

/// Inspect the loaded entry point and classify it.
pub fn entry_style(handle: &mut ExecutionHandle) -> ExtensionResult<ExtensionStyle> {
    let arity = handle.evaluate(
        "typeof module.exports.extension === 'function' ? module.exports.extension.length : null",
    )?;

    arity
        .as_u64()
        .map(ExtensionStyle::from_arity)
        .ok_or_else(|| ExtensionError::Invocation {
            extension: handle.name().to_string(),
            message: "module.exports.extension is not a function".to_string(),
        })
}

/// Build a sandbox for `extension`, call its entry point with `context`
/// and wait for the result.
pub async fn invoke(
    sandbox: &Sandbox,
    extension: &Extension,
    context: &Value,
    bindings: &Bindings,
) -> ExtensionResult<InvocationResult> {
    let mut handle = sandbox.build(&extension.name, &extension.source, bindings)?;
    let style = entry_style(&mut handle)?;
    tracing::debug!(extension = %extension.name, ?style, "invoking extension");

    let context = js_literal(context);
    let expression = match style {
        ExtensionStyle::Sync => format!("module.exports.extension({})", context),
        ExtensionStyle::Callback => format!(
            "new Promise((complete) => module.exports.extension({}, complete))",
            context
        ),
    };

    let value = handle.evaluate_async(&expression).await?;
    Ok(InvocationResult { value })
}

/// Run the source and return its `module.exports.config` (or `{}`).
///
/// The entry point is never called.
pub fn read_config(
    sandbox: &Sandbox,
    extension: &Extension,
    bindings: &Bindings,
) -> ExtensionResult<Value> {
    let mut handle = sandbox.build(&extension.name, &extension.source, bindings)?;
    handle.evaluate("module.exports.config || {}")
}
