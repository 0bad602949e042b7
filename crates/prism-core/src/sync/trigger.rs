//! Wake-up requests for the background drain loop

use std::sync::Arc;

use tokio::sync::Notify;

use crate::connectivity::Connectivity;

/// Asks the sync worker for a drain pass.
///
/// Requests made while offline are dropped; the reconnect transition
/// triggers its own pass. Requests made while a pass runs collapse into a
/// single follow-up pass.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
    connectivity: Connectivity,
}

impl SyncTrigger {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            connectivity,
        }
    }

    /// Request a pass; returns whether the request was recorded
    pub fn request(&self) -> bool {
        if !self.connectivity.is_online() {
            return false;
        }
        self.notify.notify_one();
        true
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }
}
