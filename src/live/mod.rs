//! Live preview: hot-reload pipeline, viewer hub, HTTP server and watcher.

pub mod hub;
pub mod pipeline;
pub mod server;
pub mod watch;

pub use hub::{AlertUpdate, ViewerEvent, ViewerHub};
pub use pipeline::{CycleOutcome, CycleRunner, ReloadPipeline, ReloadState, ReloadTrigger};
pub use server::{bind, router, serve};
pub use watch::{watch_root, RootWatcher};
