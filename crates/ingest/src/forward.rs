use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{AppUsageEvent, RetryConfig};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CursorCache;
use crate::pages::{AppUsageEntity, PageReader, Resource, ResourceVisitor, events_uri};
use crate::reporter::UsageReporter;
use crate::runtime::sleep_or_cancel;
use crate::settings::{BridgeSettings, OrgFilter};
use crate::stats::BridgeStats;
use crate::types::{ReportError, WalkError};

/// Reports every app usage event once and advances `last_recorded_guid`
/// behind the unstable leading edge of the log.
pub struct ForwardLoop {
    reader: PageReader,
    reporter: Arc<UsageReporter>,
    cache: Arc<CursorCache>,
    stats: Arc<BridgeStats>,
    retry: RetryConfig,
    guid_min_age: chrono::Duration,
    page_size: u32,
    orgs: OrgFilter,
    // Reported with a 201 but still too young to become the cursor.
    reported: HashSet<String>,
}

impl ForwardLoop {
    pub fn new(
        settings: &BridgeSettings,
        reader: PageReader,
        reporter: Arc<UsageReporter>,
        cache: Arc<CursorCache>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            reader,
            reporter,
            cache,
            stats,
            retry: RetryConfig::new(settings.min_interval, settings.max_interval),
            guid_min_age: settings.guid_min_age_delta(),
            page_size: settings.page_size,
            orgs: settings.orgs_to_report.clone(),
            reported: HashSet::new(),
        }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Runs one polling pass and returns the delay before the next one.
    pub async fn tick(&mut self) -> Duration {
        if self.reporter.token_missing() {
            self.stats.forward.missing_token.inc();
            let delay = self.retry.increase();
            warn!(
                delay_ms = delay.as_millis() as u64,
                "collector token unavailable, usage reporting postponed"
            );
            return delay;
        }

        let after_guid = self.cache.last_recorded_guid();
        let uri = events_uri(after_guid.as_deref(), self.page_size);
        let mut visitor = ForwardVisitor {
            reporter: &self.reporter,
            cache: &self.cache,
            stats: &self.stats,
            retry: &mut self.retry,
            reported: &mut self.reported,
            guid_min_age: self.guid_min_age,
            orgs: &self.orgs,
        };
        match self.reader.walk::<AppUsageEntity, _>(&uri, &mut visitor).await {
            Ok(()) => {
                self.stats.forward.loop_success.inc();
                self.retry.reset();
                self.retry.delay()
            }
            Err(WalkError::Fetch(err)) if err.is_guid_not_found() => {
                self.stats.forward.guid_not_found.inc();
                warn!(
                    after_guid = ?after_guid,
                    error = %err,
                    "event source lost the recorded guid, restarting from the beginning of the log"
                );
                self.cache.reset_recorded();
                self.retry.delay()
            }
            Err(WalkError::Cancelled) => {
                debug!(after_guid = ?after_guid, "forward pass interrupted by shutdown");
                self.retry.delay()
            }
            Err(WalkError::MissingToken) => {
                self.stats.forward.missing_token.inc();
                let delay = self.retry.increase();
                warn!(
                    delay_ms = delay.as_millis() as u64,
                    "source token unavailable, usage reporting postponed"
                );
                delay
            }
            Err(err) => {
                self.stats.forward.loop_failures.inc();
                let delay = self.retry.increase();
                warn!(
                    after_guid = ?after_guid,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "usage reporting pass failed"
                );
                delay
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("forward ingestion loop started");
        let mut delay = Duration::ZERO;
        while sleep_or_cancel(delay, &cancel).await {
            delay = self.tick().await;
            debug!(delay_ms = delay.as_millis() as u64, "next usage poll scheduled");
        }
        info!("forward ingestion loop stopped");
    }
}

struct ForwardVisitor<'a> {
    reporter: &'a UsageReporter,
    cache: &'a CursorCache,
    stats: &'a BridgeStats,
    retry: &'a mut RetryConfig,
    reported: &'a mut HashSet<String>,
    guid_min_age: chrono::Duration,
    orgs: &'a OrgFilter,
}

#[async_trait]
impl ResourceVisitor<AppUsageEntity> for ForwardVisitor<'_> {
    type Error = ReportError;

    async fn visit(&mut self, resource: Resource<AppUsageEntity>) -> Result<(), ReportError> {
        let event = AppUsageEvent::from(resource);

        if !self.orgs.reports(&event.org_id) {
            self.stats.forward.filtered.inc();
            debug!(guid = %event.guid, org_id = %event.org_id, "org not reported");
        } else if !self.reported.contains(&event.guid) {
            if let Err(err) = self.reporter.report(&event, false).await {
                self.stats.forward.report_failures.inc();
                return Err(err);
            }
            self.stats.forward.report_success.inc();
            self.reported.insert(event.guid.clone());
        }

        if event.is_stable(Utc::now(), self.guid_min_age) {
            self.cache.record(&event.guid, &event.created_at);
            self.reported.remove(&event.guid);
            self.retry.reset();
        } else {
            self.stats.forward.skipped_young.inc();
            debug!(
                guid = %event.guid,
                created_at = %event.created_at,
                "event inside the guid min age, cursor not advanced"
            );
        }
        Ok(())
    }
}
