pub mod app;
pub mod config;
pub mod error;
pub mod services;
pub mod startup;

pub use app::{AppState, setup_db};
pub use config::{AppConfig, ConfigSummary};
pub use error::{ApiError, AppError, Result};
pub use services::{AppServices, CacheSnapshot, DiagnosticsResponse, DiagnosticsService};
pub use startup::{AppPaths, ensure_app_data_dir};
