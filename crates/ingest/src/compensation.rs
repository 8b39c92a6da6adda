use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{AppState, AppUsageEvent, RetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CursorCache;
use crate::pages::{AppUsageEntity, PageReader, Resource, ResourceVisitor, events_uri};
use crate::reporter::UsageReporter;
use crate::runtime::sleep_or_cancel;
use crate::settings::{BridgeSettings, OrgFilter};
use crate::started::StartedApps;
use crate::stats::BridgeStats;
use crate::types::{ReportError, WalkError};

/// Replays the event log from `last_compensated_guid` and closes STARTED
/// events whose app is no longer running with a zero-quantity report.
pub struct CompensationLoop {
    reader: PageReader,
    reporter: Arc<UsageReporter>,
    cache: Arc<CursorCache>,
    stats: Arc<BridgeStats>,
    started: StartedApps,
    retry: RetryConfig,
    page_size: u32,
    orgs: OrgFilter,
}

impl CompensationLoop {
    pub fn new(
        settings: &BridgeSettings,
        reader: PageReader,
        reporter: Arc<UsageReporter>,
        cache: Arc<CursorCache>,
        stats: Arc<BridgeStats>,
        started: StartedApps,
    ) -> Self {
        Self {
            reader,
            reporter,
            cache,
            stats,
            started,
            retry: RetryConfig::new(settings.min_interval, settings.max_interval),
            page_size: settings.page_size,
            orgs: settings.orgs_to_report.clone(),
        }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs one compensation pass and returns the delay before the next one.
    /// Callers must wait for the started-app scan first.
    pub async fn tick(&mut self) -> Duration {
        if self.reporter.token_missing() {
            self.stats.compensation.missing_token.inc();
            let delay = self.retry.increase();
            warn!(
                delay_ms = delay.as_millis() as u64,
                "collector token unavailable, compensation postponed"
            );
            return delay;
        }

        let after_guid = self.cache.last_compensated_guid();
        let uri = events_uri(after_guid.as_deref(), self.page_size);
        let mut visitor = CompensationVisitor {
            reporter: &self.reporter,
            cache: &self.cache,
            stats: &self.stats,
            started: &self.started,
            orgs: &self.orgs,
        };
        match self.reader.walk::<AppUsageEntity, _>(&uri, &mut visitor).await {
            Ok(()) => {
                self.stats.compensation.loop_success.inc();
                self.retry.reset();
                self.retry.delay()
            }
            Err(WalkError::Fetch(err)) if err.is_guid_not_found() => {
                self.stats.compensation.guid_not_found.inc();
                warn!(
                    after_guid = ?after_guid,
                    error = %err,
                    "event source lost the compensated guid, restarting from the beginning of the log"
                );
                self.cache.reset_compensated();
                self.retry.delay()
            }
            Err(WalkError::Cancelled) => {
                debug!(after_guid = ?after_guid, "compensation pass interrupted by shutdown");
                self.retry.delay()
            }
            Err(WalkError::MissingToken) => {
                self.stats.compensation.missing_token.inc();
                let delay = self.retry.increase();
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    "source token unavailable, compensation postponed"
                );
                delay
            }
            Err(err) => {
                self.stats.compensation.loop_failures.inc();
                let delay = self.retry.increase();
                warn!(
                    after_guid = ?after_guid,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "compensation pass failed"
                );
                delay
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.started.wait_ready() => {}
        }
        info!(
            started_apps = self.started.len(),
            "compensation loop started"
        );
        let mut delay = Duration::ZERO;
        while sleep_or_cancel(delay, &cancel).await {
            delay = self.tick().await;
            debug!(delay_ms = delay.as_millis() as u64, "next compensation pass scheduled");
        }
        info!("compensation loop stopped");
    }
}

struct CompensationVisitor<'a> {
    reporter: &'a UsageReporter,
    cache: &'a CursorCache,
    stats: &'a BridgeStats,
    started: &'a StartedApps,
    orgs: &'a OrgFilter,
}

#[async_trait]
impl ResourceVisitor<AppUsageEntity> for CompensationVisitor<'_> {
    type Error = ReportError;

    async fn visit(&mut self, resource: Resource<AppUsageEntity>) -> Result<(), ReportError> {
        let event = AppUsageEvent::from(resource);

        if event.state == AppState::Started && self.orgs.reports(&event.org_id) {
            if self.started.contains(&event.app_guid) {
                self.stats.compensation.skipped_started.inc();
            } else {
                self.reporter.report(&event, true).await?;
                self.stats.compensation.forced_stops.inc();
                info!(
                    guid = %event.guid,
                    app_guid = %event.app_guid,
                    "reported forced stop for app no longer running"
                );
            }
        }

        self.cache.compensate(&event.guid, &event.created_at);
        Ok(())
    }
}
