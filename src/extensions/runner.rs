//! Runs the configured extension set for one reload cycle.
//!
//! The runner owns everything a cycle needs besides the pipeline itself:
//! the source and compilation collaborators, the persistence store and the
//! whitelist. Extensions run one after another in declared order, each in
//! a fresh sandbox, and the first failure aborts the cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use serde_json::{json, Value};

use crate::alerts::AlertSet;
use crate::config::{Config, ExtensionConfig, SandboxConfig};
use crate::render::{MarkdownRenderer, Renderer};

use super::capabilities::CapabilityRegistry;
use super::error::{ExtensionError, ExtensionResult};
use super::invoke::{invoke, read_config};
use super::sandbox::{Bindings, Sandbox};
use super::source::{Extension, FsSourceLoader, ScriptCompiler, SourceCompiler, SourceLoader};
use super::storage::{apply_persistence, PersistenceStore};
use super::whitelist::Whitelist;
use super::ExtensionId;

pub struct ExtensionRunner {
    /// Watched project root.
    root: PathBuf,

    /// Extensions in declared order.
    extensions: Vec<ExtensionConfig>,

    sandbox_config: SandboxConfig,
    loader: Box<dyn SourceLoader>,
    compiler: Box<dyn SourceCompiler>,
    store: Box<dyn PersistenceStore>,
    renderer: Arc<dyn Renderer>,

    /// Loaded on first use and kept for the life of the runner. A failed
    /// load is not cached, so the next cycle tries again.
    whitelist: OnceCell<Arc<Whitelist>>,
}

impl ExtensionRunner {
    /// Runner reading sources from `root` with the plain script compiler
    /// and the Markdown renderer.
    pub fn new(root: impl Into<PathBuf>, config: &Config, store: Box<dyn PersistenceStore>) -> Self {
        let root = root.into();
        Self {
            extensions: config.resolved_extensions(&root),
            sandbox_config: config.sandbox.clone(),
            loader: Box::new(FsSourceLoader::new(root.clone())),
            compiler: Box::new(ScriptCompiler),
            store,
            renderer: Arc::new(MarkdownRenderer),
            whitelist: OnceCell::new(),
            root,
        }
    }

    pub fn with_loader(mut self, loader: Box<dyn SourceLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_compiler(mut self, compiler: Box<dyn SourceCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn store(&self) -> &dyn PersistenceStore {
        self.store.as_ref()
    }

    /// Run every extension once and assemble the cycle's alert set.
    ///
    /// Every source is compiled before any extension runs, and records are
    /// written only once every invocation has succeeded, so an aborted cycle
    /// leaves the store untouched.
    pub async fn run_cycle(&mut self) -> ExtensionResult<AlertSet> {
        let sandbox = self.sandbox()?;
        let loaded = self
            .extensions
            .iter()
            .map(|entry| Ok((entry, self.load_extension(entry)?)))
            .collect::<ExtensionResult<Vec<_>>>()?;

        let mut results = Vec::with_capacity(loaded.len());
        for (entry, extension) in &loaded {
            let db = self.store.get(&entry.name)?;
            let context = json!({
                "params": Value::Object(entry.params.clone()),
                "db": db.unwrap_or(Value::Null),
            });

            let result = invoke(&sandbox, extension, &context, &self.bindings_for(entry)).await?;
            tracing::debug!(extension = %entry.name, "extension completed");
            results.push(result);
        }

        let mut alerts = AlertSet::new();
        for ((entry, _), result) in loaded.iter().zip(&results) {
            apply_persistence(self.store.as_mut(), &entry.name, result)?;
            alerts.extend_from_result(&entry.name, &result.value);
        }

        alerts.render_comments(self.renderer.as_ref());
        Ok(alerts)
    }

    /// Read every extension's exported `config` without invoking it.
    pub fn inspect(&self) -> ExtensionResult<Vec<(ExtensionId, Value)>> {
        let sandbox = self.sandbox()?;

        self.extensions
            .iter()
            .map(|entry| {
                let extension = self.load_extension(entry)?;
                let config = read_config(&sandbox, &extension, &self.bindings_for(entry))?;
                Ok((entry.name.clone(), config))
            })
            .collect()
    }

    fn sandbox(&self) -> ExtensionResult<Sandbox> {
        let whitelist = self.whitelist()?;
        let capabilities = self.capabilities()?;
        Ok(Sandbox::new(whitelist, Arc::new(capabilities), Arc::clone(&self.renderer))
            .with_root(self.root.clone()))
    }

    fn whitelist(&self) -> ExtensionResult<Arc<Whitelist>> {
        self.whitelist
            .get_or_try_init(|| {
                let whitelist = match &self.sandbox_config.whitelist {
                    Some(path) => {
                        let text = self.loader.read(path).map_err(|e| {
                            ExtensionError::WhitelistUnavailable {
                                path: self.root.join(path),
                                message: e.to_string(),
                            }
                        })?;
                        Whitelist::parse(&text)
                    }
                    None => Whitelist::builtin(),
                };
                tracing::debug!(entries = ?whitelist.entries(), "whitelist loaded");
                Ok(Arc::new(whitelist))
            })
            .map(Arc::clone)
    }

    /// Built-in capabilities plus the operator's modules, re-read each cycle.
    fn capabilities(&self) -> ExtensionResult<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::with_builtins();
        for (name, path) in &self.sandbox_config.modules {
            let source = self.loader.read(path)?;
            registry.register(name.clone(), source);
        }
        Ok(registry)
    }

    fn load_extension(&self, entry: &ExtensionConfig) -> ExtensionResult<Extension> {
        let source = self.loader.read(&entry.path)?;
        let script = self.compiler.compile(&entry.name, &source)?;
        Ok(Extension::new(entry.name.clone(), script))
    }

    /// Configured globals, plus the extension's `params`.
    fn bindings_for(&self, entry: &ExtensionConfig) -> Bindings {
        let mut bindings = self.sandbox_config.globals.clone();
        bindings.insert("params".to_string(), Value::Object(entry.params.clone()));
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::storage::MemoryStore;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn project(config: &str, files: &[(&str, &str)]) -> (TempDir, ExtensionRunner) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("rung.toml"), config).unwrap();
        for (name, contents) in files {
            let path = temp_dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }

        let config = Config::load(temp_dir.path()).unwrap();
        let runner = ExtensionRunner::new(temp_dir.path(), &config, Box::new(MemoryStore::default()));
        (temp_dir, runner)
    }

    const TWO_EXTENSIONS: &str = r#"
        [[extensions]]
        name = "first"
        path = "first.js"
        [extensions.params]
        label = "one"

        [[extensions]]
        name = "second"
        path = "second.js"
    "#;

    #[tokio::test]
    async fn test_alerts_follow_declared_order() {
        let (_dir, mut runner) = project(
            TWO_EXTENSIONS,
            &[
                ("first.js", "module.exports.extension = (ctx) => [ctx.params.label];"),
                (
                    "second.js",
                    "module.exports.extension = (ctx, done) => Promise.resolve().then(() => done('two'));",
                ),
            ],
        );

        let alerts = runner.run_cycle().await.unwrap();
        let titles: Vec<_> = alerts
            .alerts
            .iter()
            .map(|a| (a.extension.as_str(), a.content["title"].as_str().unwrap()))
            .collect();
        assert_eq!(titles, vec![("first", "one"), ("second", "two")]);
    }

    #[tokio::test]
    async fn test_db_round_trips_between_cycles() {
        let source = r#"
            module.exports.extension = (ctx) => {
                const runs = ctx.db ? ctx.db.runs : 0;
                return { alerts: ["run " + runs], db: { runs: runs + 1 } };
            };
        "#;
        let (_dir, mut runner) = project("", &[("index.js", source)]);
        let name = runner.extension_names()[0].to_string();

        runner.run_cycle().await.unwrap();
        let alerts = runner.run_cycle().await.unwrap();

        assert_eq!(alerts.alerts[0].content["title"], "run 1");
        assert_eq!(runner.store().get(&name).unwrap(), Some(json!({ "runs": 2 })));
    }

    #[tokio::test]
    async fn test_result_without_db_clears_record() {
        let source = r#"
            module.exports.extension = (ctx) => ctx.db ? null : { db: { once: true } };
        "#;
        let (_dir, mut runner) = project("", &[("index.js", source)]);
        let name = runner.extension_names()[0].to_string();

        runner.run_cycle().await.unwrap();
        assert!(runner.store().get(&name).unwrap().is_some());
        runner.run_cycle().await.unwrap();
        assert_eq!(runner.store().get(&name).unwrap(), None);
    }

    #[tokio::test]
    async fn test_failing_extension_aborts_cycle() {
        let (_dir, mut runner) = project(
            TWO_EXTENSIONS,
            &[
                ("first.js", "module.exports.extension = () => 'fine';"),
                ("second.js", "module.exports.extension = () => { throw new Error('broken'); };"),
            ],
        );

        match runner.run_cycle().await {
            Err(ExtensionError::Invocation { extension, .. }) => assert_eq!(extension, "second"),
            other => panic!("expected invocation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_aborted_cycle_writes_no_records() {
        let (_dir, mut runner) = project(
            TWO_EXTENSIONS,
            &[
                ("first.js", "module.exports.extension = () => ({ db: { seen: ['a'] } });"),
                ("second.js", "module.exports.extension = () => { throw new Error('broken'); };"),
            ],
        );

        assert!(runner.run_cycle().await.is_err());
        assert_eq!(runner.store().get("first").unwrap(), None);
        assert_eq!(runner.store().get("second").unwrap(), None);
    }

    struct RejectingCompiler(&'static str);

    impl SourceCompiler for RejectingCompiler {
        fn compile(&self, name: &str, source: &str) -> ExtensionResult<String> {
            if name == self.0 {
                return Err(ExtensionError::Compilation {
                    extension: name.to_string(),
                    message: "rejected".to_string(),
                });
            }
            ScriptCompiler.compile(name, source)
        }
    }

    #[tokio::test]
    async fn test_every_source_compiles_before_any_runs() {
        let (_dir, runner) = project(
            TWO_EXTENSIONS,
            &[
                ("first.js", "module.exports.extension = () => { throw new Error('ran'); };"),
                ("second.js", "module.exports.extension = () => null;"),
            ],
        );
        let mut runner = runner.with_compiler(Box::new(RejectingCompiler("second")));

        match runner.run_cycle().await {
            Err(ExtensionError::Compilation { extension, .. }) => assert_eq!(extension, "second"),
            other => panic!("expected compilation failure, got {:?}", other),
        }
    }

    struct MapLoader(HashMap<PathBuf, String>);

    impl SourceLoader for MapLoader {
        fn read(&self, path: &Path) -> ExtensionResult<String> {
            self.0.get(path).cloned().ok_or_else(|| ExtensionError::Source {
                path: path.to_path_buf(),
                message: "not found".to_string(),
            })
        }
    }

    struct Shouting;

    impl Renderer for Shouting {
        fn render(&self, markup: &str) -> String {
            markup.trim().to_uppercase()
        }
    }

    #[tokio::test]
    async fn test_sources_and_rendering_are_pluggable() {
        let config = Config::parse(
            r#"
            [sandbox]
            whitelist = "packages.txt"

            [[extensions]]
            name = "memo"
            path = "memo.js"
            "#,
        )
        .unwrap();
        let loader = MapLoader(HashMap::from([
            (PathBuf::from("packages.txt"), "path\n".to_string()),
            (
                PathBuf::from("memo.js"),
                "const path = require('path');\nmodule.exports.extension = () => [{ title: path.basename('/a/b.txt'), comment: 'note' }];"
                    .to_string(),
            ),
        ]));

        let mut runner = ExtensionRunner::new("/nonexistent", &config, Box::new(MemoryStore::default()))
            .with_loader(Box::new(loader))
            .with_renderer(Arc::new(Shouting));

        let alerts = runner.run_cycle().await.unwrap();
        assert_eq!(alerts.alerts[0].content["title"], "b.txt");
        assert_eq!(alerts.alerts[0].content["comment"], "NOTE");
    }

    #[tokio::test]
    async fn test_missing_source_is_a_source_error() {
        let (_dir, mut runner) = project("", &[]);
        let err = runner.run_cycle().await.unwrap_err();
        assert_eq!(err.category(), "source");
    }

    #[tokio::test]
    async fn test_unreadable_whitelist_fails_closed() {
        let (dir, mut runner) = project(
            "[sandbox]\nwhitelist = \"packages.txt\"\n",
            &[("index.js", "module.exports.extension = () => null;")],
        );

        let err = runner.run_cycle().await.unwrap_err();
        assert!(matches!(err, ExtensionError::WhitelistUnavailable { .. }));

        fs::write(dir.path().join("packages.txt"), "path\n").unwrap();
        runner.run_cycle().await.unwrap();
    }

    #[tokio::test]
    async fn test_configured_module_is_resolvable() {
        let (_dir, mut runner) = project(
            r#"
            [sandbox]
            whitelist = "packages.txt"
            [sandbox.modules]
            greet = "vendor/greet.js"
            "#,
            &[
                ("packages.txt", "# vendor modules\ngreet\n"),
                ("vendor/greet.js", "module.exports = (who) => 'hello ' + who;"),
                (
                    "index.js",
                    "module.exports.extension = () => require('greet')('world');",
                ),
            ],
        );

        let alerts = runner.run_cycle().await.unwrap();
        assert_eq!(alerts.alerts[0].content["title"], "hello world");
    }

    #[tokio::test]
    async fn test_disallowed_require_fails_cycle() {
        let (_dir, mut runner) = project(
            "",
            &[(
                "index.js",
                "const cp = require('child_process');\nmodule.exports.extension = () => null;",
            )],
        );

        let err = runner.run_cycle().await.unwrap_err();
        assert_eq!(err.to_string(), "Disallowed dependency: child_process");
    }

    #[tokio::test]
    async fn test_comments_are_rendered() {
        let (_dir, mut runner) = project(
            "",
            &[(
                "index.js",
                "module.exports.extension = () => [{ title: 't', comment: '  *hot*' }];",
            )],
        );

        let alerts = runner.run_cycle().await.unwrap();
        assert_eq!(
            alerts.alerts[0].content["comment"].as_str().unwrap().trim(),
            "<p><em>hot</em></p>"
        );
    }

    #[test]
    fn test_inspect_reads_config() {
        let (_dir, runner) = project(
            TWO_EXTENSIONS,
            &[
                (
                    "first.js",
                    "module.exports.config = { title: params.label };\nmodule.exports.extension = () => null;",
                ),
                ("second.js", "module.exports.extension = () => null;"),
            ],
        );

        let configs = runner.inspect().unwrap();
        assert_eq!(configs[0], ("first".to_string(), json!({ "title": "one" })));
        assert_eq!(configs[1], ("second".to_string(), json!({})));
    }
}
