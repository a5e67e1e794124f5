//! CLI commands for Rung.
//!
//! `live` runs the hot-reloading preview, `run` does a single cycle and
//! `inspect` prints each extension's exported config.

pub mod inspect;
pub mod live;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;

use crate::config::Config;
use crate::extensions::{ExtensionRunner, JsonFileStore};
use crate::live::CycleOutcome;

#[derive(Parser)]
#[command(name = "rung")]
#[command(about = "Sandboxed alert extensions with a live preview", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct ProjectArgs {
    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run all extensions on every change and serve a live preview
    Live {
        #[command(flatten)]
        project: ProjectArgs,

        /// Preview port (overrides rung.toml)
        #[arg(long)]
        port: Option<u16>,

        /// Do not open the preview in a browser
        #[arg(long)]
        no_open: bool,
    },

    /// Run all extensions once and print the alerts as JSON
    Run {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Print the config exported by each extension
    Inspect {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            project,
            port,
            no_open,
        } => live::run_live(&project.root, port, no_open),
        Commands::Run { project } => run::run_once(&project.root),
        Commands::Inspect { project } => inspect::run_inspect(&project.root),
    }
}

/// A loaded project: canonical root plus its configuration.
pub(crate) struct Project {
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn load(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .context(format!("Project directory not found: {}", root.display()))?;
        let config = Config::load(&root)?;
        Ok(Self { root, config })
    }

    /// Configured record file, relative paths resolved against the root.
    pub fn storage_path(&self) -> PathBuf {
        let path = self.config.storage_path();
        if path.is_relative() {
            self.root.join(path)
        } else {
            path
        }
    }

    /// Runner backed by the configured record file.
    pub fn runner(&self) -> Result<ExtensionRunner> {
        let path = self.storage_path();
        let store = JsonFileStore::open(&path)
            .with_context(|| format!("Failed to open record store {}", path.display()))?;
        tracing::debug!(path = %store.path().display(), "record store opened");

        Ok(ExtensionRunner::new(&self.root, &self.config, Box::new(store)))
    }
}

/// Print one operator-facing status line for a cycle.
pub(crate) fn report_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Updated { alerts, elapsed } => {
            println!(
                "{} {} {}",
                style("✓").green().bold(),
                style(format!("Recompiled in {}ms", elapsed.as_millis())).cyan(),
                style(format!("({} alerts)", alerts)).dim()
            );
        }
        CycleOutcome::Failed(e) => {
            eprintln!(
                "{} {} {}",
                style("✗").red().bold(),
                style(format!("[{}]", e.category())).red(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_storage_path_resolves_against_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("rung.toml"),
            "[storage]\npath = \".rung/db.json\"\n",
        )
        .unwrap();

        let project = Project::load(temp_dir.path()).unwrap();
        assert_eq!(project.storage_path(), project.root.join(".rung/db.json"));
    }
}
