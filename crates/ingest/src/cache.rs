use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bridge_core::CursorState;
use bridge_db::{Db, DbError};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::runtime::sleep_or_cancel;
use crate::stats::{BridgeStats, PerfCounters};
use crate::types::Result;

pub trait CursorStore: Send + Sync {
    fn load(&self) -> std::result::Result<Option<CursorState>, DbError>;
    fn save(&self, state: &CursorState) -> std::result::Result<String, DbError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCursorStore {
    db_path: PathBuf,
}

impl SqliteCursorStore {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

impl CursorStore for SqliteCursorStore {
    fn load(&self) -> std::result::Result<Option<CursorState>, DbError> {
        Db::open(&self.db_path)?.load_cursor_state()
    }

    fn save(&self, state: &CursorState) -> std::result::Result<String, DbError> {
        Db::open(&self.db_path)?.save_cursor_state(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Unchanged,
    Written(String),
}

type PersistedGuids = (Option<String>, Option<String>);

/// In-memory cursor record shared by both loops and written back by the flush
/// timer. `last_recorded_*` belongs to the forward loop and
/// `last_compensated_*` to the compensation loop.
pub struct CursorCache {
    state: Mutex<CursorState>,
    persisted: Mutex<PersistedGuids>,
    store: Arc<dyn CursorStore>,
    stats: Arc<BridgeStats>,
    perf: Arc<PerfCounters>,
}

impl CursorCache {
    /// Reads the cursor document once. A read failure is fatal; a missing
    /// document starts from the beginning of the log.
    pub async fn load(
        store: Arc<dyn CursorStore>,
        stats: Arc<BridgeStats>,
        perf: Arc<PerfCounters>,
    ) -> Result<Self> {
        let started = Instant::now();
        let reader = store.clone();
        let loaded = tokio::task::spawn_blocking(move || reader.load()).await?;
        perf.record("cache.read", started, loaded.is_ok());
        let state = match loaded {
            Ok(state) => state.unwrap_or_default(),
            Err(err) => {
                error!(error = %err, "failed to read cursor cache");
                return Err(err.into());
            }
        };
        stats.cache.read.inc();
        info!(
            last_recorded_guid = ?state.last_recorded_guid,
            last_compensated_guid = ?state.last_compensated_guid,
            revision = ?state.revision,
            "cursor cache loaded"
        );
        let persisted = owned_guids(&state);
        Ok(Self {
            state: Mutex::new(state),
            persisted: Mutex::new(persisted),
            store,
            stats,
            perf,
        })
    }

    fn state(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persisted(&self) -> MutexGuard<'_, PersistedGuids> {
        self.persisted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> CursorState {
        self.state().clone()
    }

    pub fn last_recorded_guid(&self) -> Option<String> {
        self.state().last_recorded_guid.clone()
    }

    pub fn last_compensated_guid(&self) -> Option<String> {
        self.state().last_compensated_guid.clone()
    }

    pub fn record(&self, guid: &str, created_at: &DateTime<Utc>) {
        let mut state = self.state();
        state.last_recorded_guid = Some(guid.to_string());
        state.last_recorded_timestamp = Some(format_ts(created_at));
    }

    pub fn reset_recorded(&self) {
        let mut state = self.state();
        state.last_recorded_guid = None;
        state.last_recorded_timestamp = None;
    }

    pub fn reset_compensated(&self) {
        let mut state = self.state();
        state.last_compensated_guid = None;
        state.last_compensated_timestamp = None;
    }

    pub fn compensate(&self, guid: &str, created_at: &DateTime<Utc>) {
        let mut state = self.state();
        state.last_compensated_guid = Some(guid.to_string());
        state.last_compensated_timestamp = Some(format_ts(created_at));
    }

    /// Persists the cursors when either GUID moved since the last write.
    /// Store failures, conflicts included, are fatal.
    pub async fn flush(&self) -> Result<FlushOutcome> {
        let snapshot = self.snapshot();
        let guids = owned_guids(&snapshot);
        if *self.persisted() == guids {
            self.stats.cache.skipped_writes.inc();
            debug!("cursor cache unchanged, skipping write");
            return Ok(FlushOutcome::Unchanged);
        }

        let store = self.store.clone();
        let started = Instant::now();
        let saved = tokio::task::spawn_blocking(move || store.save(&snapshot)).await?;
        self.perf.record("cache.write", started, saved.is_ok());
        let rev = match saved {
            Ok(rev) => rev,
            Err(err) => {
                error!(
                    error = %err,
                    last_recorded_guid = ?guids.0,
                    last_compensated_guid = ?guids.1,
                    "failed to write cursor cache"
                );
                return Err(err.into());
            }
        };
        self.state().revision = Some(rev.clone());
        *self.persisted() = guids;
        self.stats.cache.writes.inc();
        debug!(revision = %rev, "cursor cache written");
        Ok(FlushOutcome::Written(rev))
    }

    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> Result<()> {
        while sleep_or_cancel(period, &cancel).await {
            self.flush().await?;
        }
        Ok(())
    }
}

fn owned_guids(state: &CursorState) -> PersistedGuids {
    (
        state.last_recorded_guid.clone(),
        state.last_compensated_guid.clone(),
    )
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
