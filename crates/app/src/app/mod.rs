use std::path::Path;
use std::sync::Arc;

use bridge_db::Db;
use ingest::{Bridge, BridgeHandles, SqliteCursorStore};
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::services::AppServices;
use crate::startup::{AppPaths, ensure_app_data_dir};

/// Application state shared by the diagnostic server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub paths: AppPaths,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: AppConfig, handles: BridgeHandles) -> Self {
        let paths = config.paths();
        let config = Arc::new(config);
        let services = AppServices::new(config.clone(), handles);
        Self {
            config,
            paths,
            services,
        }
    }

    /// Prepares the cursor store and loads the cursors. The returned bridge
    /// has not started polling yet.
    pub async fn start(config: AppConfig) -> Result<(Self, Bridge)> {
        let paths = config.paths();
        ensure_app_data_dir(&paths)?;
        setup_db(&paths.db_path)?;
        info!(db_path = %paths.db_path.display(), "cursor store ready");

        let store = Arc::new(SqliteCursorStore::new(paths.db_path.clone()));
        let bridge = Bridge::new(config.bridge_settings(), config.bridge_auth(), store).await?;
        let state = Self::new(config, bridge.handles());
        Ok((state, bridge))
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
