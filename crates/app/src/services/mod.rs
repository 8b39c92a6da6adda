mod diagnostics;

use std::sync::Arc;

use ingest::BridgeHandles;

use crate::config::AppConfig;

pub use diagnostics::{CacheSnapshot, DiagnosticsResponse, DiagnosticsService};

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub diagnostics: DiagnosticsService,
}

impl AppServices {
    pub fn new(config: SharedConfig, handles: BridgeHandles) -> Self {
        Self {
            diagnostics: DiagnosticsService::new(config, handles),
        }
    }
}
