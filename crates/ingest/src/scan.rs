use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::AppState;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pages::{AppEntity, PageReader, Resource, ResourceVisitor, apps_uri};
use crate::runtime::sleep_or_cancel;
use crate::settings::BridgeSettings;
use crate::started::StartedApps;
use crate::stats::BridgeStats;
use crate::types::WalkError;

/// One-shot snapshot of the apps running when the bridge starts.
pub struct LeadingAppsScan {
    reader: PageReader,
    started: StartedApps,
    stats: Arc<BridgeStats>,
    page_size: u32,
    settle_delay: Duration,
    retry_delay: Duration,
}

impl LeadingAppsScan {
    pub fn new(
        settings: &BridgeSettings,
        reader: PageReader,
        started: StartedApps,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            reader,
            started,
            stats,
            page_size: settings.page_size,
            settle_delay: settings.guid_min_age,
            retry_delay: settings.scan_retry_interval,
        }
    }

    pub async fn scan(&self) -> Result<(), WalkError<Infallible>> {
        let mut visitor = StartedCollector {
            started: &self.started,
        };
        self.reader
            .walk::<AppEntity, _>(&apps_uri(self.page_size), &mut visitor)
            .await
    }

    /// Waits for the event log to settle, then scans until one pass succeeds.
    pub async fn run(self, cancel: CancellationToken) {
        if !sleep_or_cancel(self.settle_delay, &cancel).await {
            return;
        }
        loop {
            self.stats.scan.attempts.inc();
            match self.scan().await {
                Ok(()) => {
                    self.stats.scan.started_apps.set(self.started.len() as u64);
                    self.started.mark_ready();
                    info!(started_apps = self.started.len(), "leading apps scan complete");
                    return;
                }
                Err(WalkError::Cancelled) => return,
                Err(err) => {
                    self.stats.scan.failures.inc();
                    warn!(
                        error = %err,
                        retry_ms = self.retry_delay.as_millis() as u64,
                        "leading apps scan failed"
                    );
                }
            }
            if !sleep_or_cancel(self.retry_delay, &cancel).await {
                return;
            }
        }
    }
}

struct StartedCollector<'a> {
    started: &'a StartedApps,
}

#[async_trait]
impl ResourceVisitor<AppEntity> for StartedCollector<'_> {
    type Error = Infallible;

    async fn visit(&mut self, resource: Resource<AppEntity>) -> Result<(), Infallible> {
        if resource.entity.state == AppState::Started {
            self.started.insert(&resource.metadata.guid);
        }
        Ok(())
    }
}
