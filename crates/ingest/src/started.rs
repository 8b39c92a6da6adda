use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

/// Written only by the scan and read only by the compensation loop, which
/// waits for [`StartedApps::wait_ready`] before its first traversal.
#[derive(Clone)]
pub struct StartedApps {
    apps: Arc<RwLock<HashSet<String>>>,
    ready: Arc<watch::Sender<bool>>,
}

impl Default for StartedApps {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            apps: Arc::default(),
            ready: Arc::new(ready),
        }
    }
}

impl StartedApps {
    pub fn insert(&self, app_guid: &str) -> bool {
        self.apps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app_guid.to_string())
    }

    pub fn contains(&self, app_guid: &str) -> bool {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(app_guid)
    }

    pub fn len(&self) -> usize {
        self.apps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
