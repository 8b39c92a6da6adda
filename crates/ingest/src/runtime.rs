use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{CursorCache, CursorStore};
use crate::compensation::CompensationLoop;
use crate::forward::ForwardLoop;
use crate::pages::PageReader;
use crate::reporter::UsageReporter;
use crate::scan::LeadingAppsScan;
use crate::settings::BridgeSettings;
use crate::started::StartedApps;
use crate::stats::{BridgeStats, PerfCounters};
use crate::token::TokenProvider;
use crate::types::Result;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Sleeps for `delay` unless cancelled first. Returns false once cancelled.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
    }
}

/// Token sources for the event API and the collector. `None` means the peer
/// is not secured and requests go out without an `Authorization` header.
#[derive(Clone, Default)]
pub struct BridgeAuth {
    pub source: Option<Arc<dyn TokenProvider>>,
    pub system: Option<Arc<dyn TokenProvider>>,
}

#[derive(Clone)]
pub struct BridgeHandles {
    pub cache: Arc<CursorCache>,
    pub stats: Arc<BridgeStats>,
    pub perf: Arc<PerfCounters>,
    pub started: StartedApps,
}

/// Owns the four bridge tasks: forward ingestion, compensation, the leading
/// apps scan and the cursor flush timer.
pub struct Bridge {
    settings: BridgeSettings,
    handles: BridgeHandles,
    reader: PageReader,
    reporter: Arc<UsageReporter>,
    cancel: CancellationToken,
}

impl Bridge {
    /// Loads the cursor cache and wires the HTTP clients. Fails when the
    /// cursor document cannot be read.
    pub async fn new(
        settings: BridgeSettings,
        auth: BridgeAuth,
        store: Arc<dyn CursorStore>,
    ) -> Result<Self> {
        let stats = Arc::new(BridgeStats::default());
        let perf = Arc::new(PerfCounters::default());
        let cache = Arc::new(CursorCache::load(store, stats.clone(), perf.clone()).await?);
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let cancel = CancellationToken::new();

        let reader = PageReader::new(
            client.clone(),
            settings.api.clone(),
            auth.source,
            perf.clone(),
        )
        .with_cancel(cancel.clone());
        let reporter = Arc::new(UsageReporter::new(
            client,
            &settings.collector,
            auth.system,
            perf.clone(),
        ));
        Ok(Self {
            settings,
            handles: BridgeHandles {
                cache,
                stats,
                perf,
                started: StartedApps::default(),
            },
            reader,
            reporter,
            cancel,
        })
    }

    pub fn handles(&self) -> BridgeHandles {
        self.handles.clone()
    }

    /// Runs every loop until `shutdown` resolves or the cursor cache hits a
    /// fatal error, then stops the loops and flushes the cursors one last time.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            settings,
            handles,
            reader,
            reporter,
            cancel,
        } = self;
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        let scan = LeadingAppsScan::new(
            &settings,
            reader.clone(),
            handles.started.clone(),
            handles.stats.clone(),
        );
        let token = cancel.clone();
        tasks.spawn(async move {
            scan.run(token).await;
            Ok(())
        });

        let forward = ForwardLoop::new(
            &settings,
            reader.clone(),
            reporter.clone(),
            handles.cache.clone(),
            handles.stats.clone(),
        );
        let token = cancel.clone();
        tasks.spawn(async move {
            forward.run(token).await;
            Ok(())
        });

        let compensation = CompensationLoop::new(
            &settings,
            reader,
            reporter,
            handles.cache.clone(),
            handles.stats.clone(),
            handles.started.clone(),
        );
        let token = cancel.clone();
        tasks.spawn(async move {
            compensation.run(token).await;
            Ok(())
        });

        tasks.spawn(
            handles
                .cache
                .clone()
                .run(settings.flush_period(), cancel.clone()),
        );
        info!(
            api = %settings.api,
            collector = %settings.collector,
            "usage bridge running"
        );

        let mut outcome = Ok(());
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping bridge");
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(Ok(()))) => continue,
                    Some(Ok(Err(err))) => {
                        error!(error = %err, "bridge task failed, stopping bridge");
                        outcome = Err(err);
                        break;
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "bridge task aborted, stopping bridge");
                        outcome = Err(err.into());
                        break;
                    }
                    None => break,
                },
            }
        }

        cancel.cancel();
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                error!(error = %err, "bridge task failed during shutdown");
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        if outcome.is_ok() {
            handles.cache.flush().await?;
            info!("cursor cache flushed, bridge stopped");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_or_cancel_reports_cancellation() {
        let cancel = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_millis(1), &cancel).await);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let slept = tokio::time::timeout(
            Duration::from_secs(5),
            sleep_or_cancel(Duration::from_secs(60), &cancel),
        )
        .await
        .expect("cancelled before timeout");
        assert!(!slept);
        assert!(!sleep_or_cancel(Duration::ZERO, &cancel).await);
    }
}
