//! Hot-reload pipeline.
//!
//! ```text
//! Idle ──trigger──> Recompiling ──ok──> Broadcasting ──> Idle
//!                        └──────err──────────────────────> Idle
//! ```
//!
//! Cycles never overlap. Triggers fired while a cycle is in flight collapse
//! into a single pending permit, so a burst of changes produces at most one
//! trailing cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::alerts::AlertSet;
use crate::extensions::{ExtensionError, ExtensionResult, ExtensionRunner};

use super::hub::{ViewerEvent, ViewerHub};

/// Anything that can compute a fresh alert set.
#[allow(async_fn_in_trait)]
pub trait CycleRunner {
    async fn run_cycle(&mut self) -> ExtensionResult<AlertSet>;
}

impl CycleRunner for ExtensionRunner {
    async fn run_cycle(&mut self) -> ExtensionResult<AlertSet> {
        ExtensionRunner::run_cycle(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Recompiling,
    Broadcasting,
}

/// Result of one cycle, handed to the operator-facing reporter.
#[derive(Debug)]
pub enum CycleOutcome {
    Updated { alerts: usize, elapsed: Duration },
    Failed(ExtensionError),
}

/// Coalescing reload trigger, cheap to clone into watcher callbacks.
#[derive(Clone, Default)]
pub struct ReloadTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Default)]
struct TriggerInner {
    notify: Notify,
    shutdown: AtomicBool,
}

impl ReloadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a cycle. Repeated calls before the pipeline picks the
    /// request up count once.
    pub fn fire(&self) {
        self.inner.notify.notify_one();
    }

    /// Stop the pipeline once the in-flight cycle, if any, completes.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Wait for the next request. `false` means shut down.
    async fn wait(&self) -> bool {
        if self.is_shutdown() {
            return false;
        }
        self.inner.notify.notified().await;
        !self.is_shutdown()
    }
}

pub struct ReloadPipeline<R> {
    runner: R,
    hub: Arc<ViewerHub>,
    state: ReloadState,
    cycles: u64,
}

impl<R: CycleRunner> ReloadPipeline<R> {
    pub fn new(runner: R, hub: Arc<ViewerHub>) -> Self {
        Self {
            runner,
            hub,
            state: ReloadState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Completed cycles, successful or not.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle and broadcast its outcome.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.state = ReloadState::Recompiling;
        self.hub.publish(ViewerEvent::Load);
        let started = Instant::now();

        let outcome = match self.runner.run_cycle().await {
            Ok(set) => {
                self.state = ReloadState::Broadcasting;
                let elapsed = started.elapsed();
                let alerts = set.len();
                let event = ViewerEvent::update(&set, Some(elapsed.as_millis() as u64));
                self.hub.replace(set).await;
                let viewers = self.hub.publish(event);
                tracing::debug!(
                    alerts,
                    viewers,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "reload complete"
                );
                CycleOutcome::Updated { alerts, elapsed }
            }
            Err(e) => {
                tracing::debug!(
                    category = e.category(),
                    extension = ?e.extension(),
                    "reload failed: {}",
                    e
                );
                self.hub.publish(ViewerEvent::Failure(e.to_string()));
                CycleOutcome::Failed(e)
            }
        };

        self.cycles += 1;
        self.state = ReloadState::Idle;
        outcome
    }

    /// Serve triggers until shutdown, reporting each outcome.
    pub async fn run<F>(&mut self, trigger: ReloadTrigger, mut report: F)
    where
        F: FnMut(&CycleOutcome),
    {
        while trigger.wait().await {
            let outcome = self.run_cycle().await;
            report(&outcome);
        }
        tracing::debug!(cycles = self.cycles, "reload pipeline stopped");
    }
}
