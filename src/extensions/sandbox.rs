//! Per-invocation V8 sandbox for extension scripts.
//!
//! Every [`Sandbox::build`] creates a fresh `JsRuntime` (its own isolate),
//! installs the prelude and runs the extension source. Nothing is shared
//! between handles: two builds never see each other's `module`/`exports`
//! or globals. Handles are dropped as soon as the invocation completes.

use std::path::PathBuf;
use std::sync::Arc;

use deno_core::error::{AnyError, JsError};
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde::Serialize;
use serde_json::Value;

use crate::render::Renderer;

use super::capabilities::CapabilityRegistry;
use super::error::{ExtensionError, ExtensionResult};
use super::ops::{rung_sandbox, CapabilityRejection, SandboxState};
use super::whitelist::Whitelist;
use super::ExtensionId;

const BOOTSTRAP: &str = include_str!("bootstrap.js");

/// Extra globals injected into the extension's context.
pub type Bindings = serde_json::Map<String, Value>;

/// Stage of a handle's life, used to classify script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prelude,
    Load,
    Run,
}

/// Builds isolated execution contexts for extensions.
///
/// Cheap to clone; the whitelist, capability registry and renderer are
/// shared read-only between builds.
#[derive(Clone)]
pub struct Sandbox {
    whitelist: Arc<Whitelist>,
    capabilities: Arc<CapabilityRegistry>,
    renderer: Arc<dyn Renderer>,
    root: Option<PathBuf>,
}

impl Sandbox {
    pub fn new(
        whitelist: Arc<Whitelist>,
        capabilities: Arc<CapabilityRegistry>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            whitelist,
            capabilities,
            renderer,
            root: None,
        }
    }

    /// Confine the `fs` capability to `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Build a fresh context for `name` and run `source` inside it.
    ///
    /// Syntax errors surface as [`ExtensionError::Compilation`], a refused
    /// `require` as [`ExtensionError::DisallowedDependency`] and any other
    /// top-level throw as [`ExtensionError::Invocation`].
    pub fn build(
        &self,
        name: &str,
        source: &str,
        bindings: &Bindings,
    ) -> ExtensionResult<ExecutionHandle> {
        let options = RuntimeOptions {
            extensions: vec![rung_sandbox::init_ops_and_esm()],
            ..Default::default()
        };
        let mut runtime = JsRuntime::new(options);

        runtime.op_state().borrow_mut().put(SandboxState::new(
            name.to_string(),
            Arc::clone(&self.whitelist),
            Arc::clone(&self.capabilities),
            Arc::clone(&self.renderer),
            self.root.clone(),
        ));

        let mut handle = ExecutionHandle {
            name: name.to_string(),
            runtime,
        };

        let prelude = format!(
            "({})({}, {});",
            BOOTSTRAP,
            js_literal(&name),
            js_literal(bindings)
        );
        handle.execute("<rung:prelude>", prelude, Phase::Prelude)?;

        let script = format!("{}\n//# sourceURL={}.js\n", source, name);
        handle.execute("<extension>", script, Phase::Load)?;
        handle.execute(
            "<rung:loaded>",
            "module.loaded = true;".to_string(),
            Phase::Prelude,
        )?;

        Ok(handle)
    }

    /// Run `source` in a throwaway context and return its `module.exports`
    /// as JSON. Functions are dropped.
    pub fn run_isolated(
        &self,
        name: &str,
        source: &str,
        bindings: &Bindings,
    ) -> ExtensionResult<Value> {
        let mut handle = self.build(name, source, bindings)?;
        handle.evaluate("module.exports")
    }
}

/// A built context, owned by exactly one invocation.
pub struct ExecutionHandle {
    name: ExtensionId,
    runtime: JsRuntime,
}

impl ExecutionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate a JavaScript expression and return its JSON value.
    pub fn evaluate(&mut self, expression: &str) -> ExtensionResult<Value> {
        let code = format!("{}(({}))", STRINGIFY, expression);
        let global = self.execute("<rung:evaluate>", code, Phase::Run)?;
        let text = self.read_string(global);
        self.parse_json(&text)
    }

    /// Evaluate an expression that yields a promise (or a plain value),
    /// drive the event loop until it settles and return its JSON value.
    pub async fn evaluate_async(&mut self, expression: &str) -> ExtensionResult<Value> {
        let code = format!("Promise.resolve({}).then({})", expression, STRINGIFY);
        let promise = self.execute("<rung:invoke>", code, Phase::Run)?;

        let resolve = Box::pin(self.runtime.resolve(promise));
        let settled = self
            .runtime
            .with_event_loop_promise(resolve, PollEventLoopOptions::default())
            .await;

        match settled {
            Ok(global) => {
                let text = self.read_string(global);
                self.parse_json(&text)
            }
            Err(e) => Err(self.classify(e, Phase::Run)),
        }
    }

    fn execute(
        &mut self,
        script_name: &'static str,
        code: String,
        phase: Phase,
    ) -> ExtensionResult<v8::Global<v8::Value>> {
        match self.runtime.execute_script(script_name, code) {
            Ok(value) => Ok(value),
            Err(e) => Err(self.classify(e, phase)),
        }
    }

    fn read_string(&mut self, global: v8::Global<v8::Value>) -> String {
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, global);
        local
            .to_string(scope)
            .map(|s| s.to_rust_string_lossy(scope))
            .unwrap_or_else(|| "null".to_string())
    }

    fn parse_json(&self, text: &str) -> ExtensionResult<Value> {
        serde_json::from_str(text).map_err(|e| ExtensionError::Invocation {
            extension: self.name.clone(),
            message: format!("Result is not serializable: {}", e),
        })
    }

    /// Map a script failure onto the extension error taxonomy.
    ///
    /// A recorded `require` refusal only wins when the error being thrown is
    /// that refusal; one the extension caught says nothing about later errors.
    fn classify(&mut self, error: AnyError, phase: Phase) -> ExtensionError {
        let message = error.to_string();
        let rejection = {
            let state = self.runtime.op_state();
            let mut state = state.borrow_mut();
            let rejection = state.borrow_mut::<SandboxState>().take_rejection();
            rejection.filter(|rejection| message.contains(&rejection.to_string()))
        };

        match rejection {
            Some(CapabilityRejection::Disallowed(name)) => {
                return ExtensionError::DisallowedDependency {
                    extension: self.name.clone(),
                    name,
                };
            }
            Some(CapabilityRejection::Unknown(name)) => {
                return ExtensionError::UnknownCapability {
                    extension: self.name.clone(),
                    name,
                };
            }
            None => {}
        }

        let js_error = error.downcast_ref::<JsError>();
        let is_syntax_error = js_error
            .and_then(|e| e.name.as_deref())
            .map_or(false, |n| n == "SyntaxError");

        match phase {
            Phase::Load if is_syntax_error => ExtensionError::Compilation {
                extension: self.name.clone(),
                message,
            },
            Phase::Prelude => ExtensionError::Invocation {
                extension: self.name.clone(),
                message: format!("Sandbox setup failed: {}", message),
            },
            _ => ExtensionError::Invocation {
                extension: self.name.clone(),
                message,
            },
        }
    }
}

/// JSON encoder applied to every value leaving the isolate.
const STRINGIFY: &str = "((value) => JSON.stringify(value === undefined ? null : value))";

pub(crate) fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
