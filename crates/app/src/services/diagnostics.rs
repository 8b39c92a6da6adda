use std::collections::BTreeMap;

use bridge_core::CursorState;
use ingest::{BridgeHandles, PerfEntry};
use serde::Serialize;

use super::SharedConfig;
use crate::config::ConfigSummary;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    #[serde(flatten)]
    pub cursor: CursorState,
    pub revision: Option<String>,
}

/// Payload of the bridge diagnostic endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub config: ConfigSummary,
    pub cache: CacheSnapshot,
    pub statistics: serde_json::Value,
    pub performance: BTreeMap<&'static str, PerfEntry>,
}

#[derive(Clone)]
pub struct DiagnosticsService {
    config: SharedConfig,
    handles: BridgeHandles,
}

impl DiagnosticsService {
    pub fn new(config: SharedConfig, handles: BridgeHandles) -> Self {
        Self { config, handles }
    }

    pub fn snapshot(&self) -> Result<DiagnosticsResponse> {
        let cursor = self.handles.cache.snapshot();
        let revision = cursor.revision.clone();
        let mut statistics = serde_json::to_value(&*self.handles.stats)?;
        if let Some(scan) = statistics.get_mut("scan").and_then(|scan| scan.as_object_mut()) {
            scan.insert("ready".to_string(), self.handles.started.is_ready().into());
        }
        Ok(DiagnosticsResponse {
            config: self.config.summary(),
            cache: CacheSnapshot { cursor, revision },
            statistics,
            performance: self.handles.perf.snapshot(),
        })
    }
}
