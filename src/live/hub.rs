//! Viewer fan-out and the current alert set.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use crate::alerts::{Alert, AlertSet};

/// Events queued per viewer before it is considered lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// One message pushed to viewer sessions.
///
/// Serialized as `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ViewerEvent {
    /// A reload cycle started.
    Load,
    /// A new alert set is current.
    Update(AlertUpdate),
    /// A reload cycle failed; the previous set stays current.
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertUpdate {
    pub alerts: Vec<Alert>,
    /// Cycle duration. Absent in the snapshot sent on connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl ViewerEvent {
    pub fn update(set: &AlertSet, elapsed_ms: Option<u64>) -> Self {
        Self::Update(AlertUpdate {
            alerts: set.alerts.clone(),
            elapsed_ms,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"event":"load"}"#.to_string())
    }
}

/// Shared between the reload pipeline (single writer) and the preview
/// server (readers).
pub struct ViewerHub {
    sender: broadcast::Sender<ViewerEvent>,
    current: RwLock<Arc<AlertSet>>,
}

impl ViewerHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            current: RwLock::new(Arc::new(AlertSet::new())),
        }
    }

    /// Register a viewer. Subscribe before taking the snapshot so that no
    /// update published in between is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewerEvent> {
        self.sender.subscribe()
    }

    /// Send to every connected viewer. Returns how many received it.
    pub fn publish(&self, event: ViewerEvent) -> usize {
        // No receivers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    pub async fn current(&self) -> Arc<AlertSet> {
        Arc::clone(&*self.current.read().await)
    }

    /// The update a newly connected viewer starts from.
    pub async fn snapshot(&self) -> ViewerEvent {
        ViewerEvent::update(&*self.current().await, None)
    }

    /// Make `set` the current alert set, returning it.
    pub async fn replace(&self, set: AlertSet) -> Arc<AlertSet> {
        let set = Arc::new(set);
        *self.current.write().await = Arc::clone(&set);
        set
    }

    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ViewerHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
