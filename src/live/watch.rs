//! Recursive watch on the project root feeding the reload trigger.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::error::{RungError, RungResult};

use super::pipeline::ReloadTrigger;

/// Keeps the watch alive; dropping it stops watching.
pub type RootWatcher = Debouncer<RecommendedWatcher>;

/// Watch `root` and fire `trigger` on any change below it.
///
/// Changes to `ignored` files (the record store, when it lives under the
/// root) never fire. `on_change` is called with the changed paths before
/// the trigger fires.
pub fn watch_root<F>(
    root: &Path,
    debounce: Duration,
    ignored: Vec<PathBuf>,
    trigger: ReloadTrigger,
    mut on_change: F,
) -> RungResult<RootWatcher>
where
    F: FnMut(&[&Path]) + Send + 'static,
{
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let paths = relevant(events.iter().map(|e| e.path.as_path()), &ignored);
            if paths.is_empty() {
                return;
            }
            tracing::debug!(changes = paths.len(), "changes detected");
            on_change(&paths);
            trigger.fire();
        }
        Err(e) => tracing::warn!("Watch error: {:?}", e),
    })
    .map_err(|e| RungError::Watch(e.to_string()))?;

    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| RungError::Watch(format!("{}: {}", root.display(), e)))?;

    Ok(debouncer)
}

/// Changed paths that should cause a reload.
fn relevant<'a>(paths: impl Iterator<Item = &'a Path>, ignored: &[PathBuf]) -> Vec<&'a Path> {
    paths
        .filter(|path| !ignored.iter().any(|ignored| ignored == path))
        .collect()
}
