//! Live preview for `rung live`.
//!
//! Watches the project root, reruns every extension on each change and
//! pushes the results to connected browsers.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use console::style;
use tokio::sync::Notify;

use crate::live::{self, ReloadPipeline, ReloadTrigger, ViewerHub};

use super::{report_outcome, Project};

const BANNER: &str = r"
   ___       _  _______
  / _ \__ __/ |/ / ___/
 / , _/ // /    / (_ /
/_/|_|\_,_/_/|_/\___/
";

pub fn run_live(root: &Path, port: Option<u16>, no_open: bool) -> Result<()> {
    let mut project = Project::load(root)?;
    if let Some(port) = port {
        project.config.server.port = port;
    }
    if no_open {
        project.config.server.open_browser = false;
    }
    project.config.validate()?;

    let runner = project.runner()?;
    println!(
        "{} {} {}",
        style("✓").green().bold(),
        style("Loaded extensions:").cyan(),
        style(runner.extension_names().join(", ")).bold()
    );

    let hub = Arc::new(ViewerHub::default());
    let trigger = ReloadTrigger::new();

    // JsRuntime is !Send, so cycles run on their own single-threaded runtime.
    let pipeline = {
        let hub = Arc::clone(&hub);
        let trigger = trigger.clone();
        thread::Builder::new()
            .name("rung-pipeline".to_string())
            .spawn(move || -> Result<()> {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("Failed to start pipeline runtime")?;
                rt.block_on(async {
                    let mut pipeline = ReloadPipeline::new(runner, hub);
                    pipeline.run(trigger, report_outcome).await;
                });
                Ok(())
            })
            .context("Failed to spawn pipeline thread")?
    };
    trigger.fire();

    let store_path = project.storage_path();
    if store_path.starts_with(&project.root) {
        tracing::debug!(path = %store_path.display(), "record store excluded from watch");
    }
    let _watcher = live::watch_root(
        &project.root,
        Duration::from_millis(project.config.watch.debounce_ms),
        vec![store_path],
        trigger.clone(),
        |paths| {
            let names: Vec<_> = paths
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .collect();
            println!(
                "{} Changes detected: {}",
                style("→").cyan(),
                style(names.join(", ")).yellow()
            );
        },
    )?;

    let stop = Arc::new(Notify::new());
    {
        let stop = Arc::clone(&stop);
        let trigger = trigger.clone();
        ctrlc::set_handler(move || {
            trigger.shutdown();
            stop.notify_one();
        })?;
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to start server runtime")?;
    let served = rt.block_on(async {
        let listener = live::bind(project.config.server.port).await?;
        let url = format!("http://localhost:{}", project.config.server.port);

        println!("{}", style(BANNER).cyan().bold());
        println!("{} Live preview at {}", style("→").cyan(), style(&url).bold());
        println!("{}", style("Watching for changes...").dim());
        println!("{}", style("Press Ctrl+C to stop.").dim());
        println!();

        if project.config.server.open_browser {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        live::serve(listener, hub, async move { stop.notified().await }).await
    });

    trigger.shutdown();
    let pipeline_result = pipeline
        .join()
        .map_err(|_| anyhow!("Pipeline thread panicked"))?;

    served?;
    pipeline_result?;

    println!();
    println!("{}", style("Live preview stopped.").dim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_is_plain_ascii() {
        assert!(BANNER.is_ascii());
        assert_eq!(BANNER.trim_matches('\n').lines().count(), 4);
    }
}
