use std::sync::Arc;
use std::time::Instant;

use bridge_core::{AppUsageEvent, UsageMeasurement, build_measurement};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::pages::with_trailing_slash;
use crate::stats::PerfCounters;
use crate::token::TokenProvider;
use crate::types::ReportError;

const COLLECTOR_PATH: &str = "v1/metering/collected/usage";

/// Submits usage measurements to the collector. Never retries on its own.
pub struct UsageReporter {
    client: reqwest::Client,
    endpoint: Url,
    auth: Option<Arc<dyn TokenProvider>>,
    perf: Arc<PerfCounters>,
}

impl UsageReporter {
    pub fn new(
        client: reqwest::Client,
        collector: &Url,
        auth: Option<Arc<dyn TokenProvider>>,
        perf: Arc<PerfCounters>,
    ) -> Self {
        let endpoint = collector_endpoint(collector);
        Self {
            client,
            endpoint,
            auth,
            perf,
        }
    }

    /// True when the collector expects a token and none is available.
    pub fn token_missing(&self) -> bool {
        self.auth
            .as_ref()
            .is_some_and(|auth| auth.bearer_token().is_none())
    }

    /// Reports `event`, zeroing its quantities when `forced_stop` is set or the
    /// event is a STOP. Only a 201 response counts as success.
    pub async fn report(
        &self,
        event: &AppUsageEvent,
        forced_stop: bool,
    ) -> Result<UsageMeasurement, ReportError> {
        let measurement = build_measurement(event, forced_stop);
        let started = Instant::now();
        let result = self.submit(&measurement).await;
        self.perf.record("usage.report", started, result.is_ok());
        match &result {
            Ok(()) => debug!(
                guid = %event.guid,
                app_guid = %event.app_guid,
                forced_stop,
                "usage reported"
            ),
            Err(err) => warn!(
                guid = %event.guid,
                app_guid = %event.app_guid,
                usage = ?measurement,
                error = %err,
                "usage report failed"
            ),
        }
        result.map(|()| measurement)
    }

    async fn submit(&self, measurement: &UsageMeasurement) -> Result<(), ReportError> {
        let mut request = self.client.post(self.endpoint.clone()).json(measurement);
        if let Some(auth) = &self.auth {
            let token = auth.bearer_token().ok_or(ReportError::MissingToken)?;
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::CREATED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReportError::Rejected { status, body })
    }
}

fn collector_endpoint(collector: &Url) -> Url {
    let base = with_trailing_slash(collector);
    base.join(COLLECTOR_PATH).unwrap_or(base)
}
