mod cache;
mod compensation;
mod forward;
mod pages;
mod reporter;
mod runtime;
mod scan;
mod settings;
mod started;
mod stats;
mod token;
mod types;

pub use cache::{CursorCache, CursorStore, FlushOutcome, SqliteCursorStore};
pub use compensation::CompensationLoop;
pub use forward::ForwardLoop;
pub use pages::{
    AppEntity, AppUsageEntity, Metadata, PageReader, Resource, ResourceVisitor, apps_uri,
    events_uri,
};
pub use reporter::UsageReporter;
pub use runtime::{Bridge, BridgeAuth, BridgeHandles};
pub use scan::LeadingAppsScan;
pub use settings::{BridgeSettings, OrgFilter};
pub use started::StartedApps;
pub use stats::{BridgeStats, Counter, PerfCounters, PerfEntry};
pub use token::{StaticToken, TokenProvider};
pub use types::{
    FetchError, GUID_NOT_FOUND_CODE, IngestError, ReportError, Result, WalkError,
};
