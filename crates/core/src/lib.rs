mod backoff;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use backoff::RetryConfig;

pub const RESOURCE_ID: &str = "linux-container";
pub const PLAN_ID: &str = "standard";
pub const MEASURE_INSTANCE_MEMORY: &str = "current_instance_memory";
pub const MEASURE_RUNNING_INSTANCES: &str = "current_running_instances";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Started,
    Stopped,
    BuildpackSet,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUsageEvent {
    pub guid: String,
    pub created_at: DateTime<Utc>,
    pub app_guid: String,
    pub app_name: Option<String>,
    pub org_id: String,
    pub space_id: String,
    pub space_name: Option<String>,
    pub memory_mb_per_instance: u64,
    pub instance_count: u64,
    pub state: AppState,
}

impl AppUsageEvent {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Events younger than `min_age` sit on the leading edge and may still be reordered.
    pub fn is_stable(&self, now: DateTime<Utc>, min_age: Duration) -> bool {
        self.age_at(now) > min_age
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub measure: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMeasurement {
    pub start: i64,
    pub end: i64,
    pub organization_id: String,
    pub space_id: String,
    pub consumer_id: String,
    pub resource_id: String,
    pub plan_id: String,
    pub resource_instance_id: String,
    #[serde(rename = "measured_usage")]
    pub measures: Vec<Measure>,
}

impl UsageMeasurement {
    pub fn quantity(&self, measure: &str) -> Option<u64> {
        self.measures
            .iter()
            .find(|entry| entry.measure == measure)
            .map(|entry| entry.quantity)
    }

    pub fn is_stop(&self) -> bool {
        self.measures.iter().all(|entry| entry.quantity == 0)
    }
}

/// Durable reconciliation cursors. The revision is the store's concurrency
/// token and never part of the persisted body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(rename = "lastRecordedGUID", default)]
    pub last_recorded_guid: Option<String>,
    #[serde(rename = "lastRecordedTimestamp", default)]
    pub last_recorded_timestamp: Option<String>,
    #[serde(rename = "lastCompensatedGUID", default)]
    pub last_compensated_guid: Option<String>,
    #[serde(rename = "lastCompensatedTimestamp", default)]
    pub last_compensated_timestamp: Option<String>,
    #[serde(skip)]
    pub revision: Option<String>,
}

impl CursorState {
    pub fn guids(&self) -> (Option<&str>, Option<&str>) {
        (
            self.last_recorded_guid.as_deref(),
            self.last_compensated_guid.as_deref(),
        )
    }
}

pub fn build_measurement(event: &AppUsageEvent, forced_stop: bool) -> UsageMeasurement {
    let stopped = forced_stop || event.state == AppState::Stopped;
    let (memory, instances) = if stopped {
        (0, 0)
    } else {
        (event.memory_mb_per_instance, event.instance_count)
    };
    let ts = event.created_at.timestamp_millis();
    UsageMeasurement {
        start: ts,
        end: ts,
        organization_id: event.org_id.clone(),
        space_id: event.space_id.clone(),
        consumer_id: format!("app:{}", event.app_guid),
        resource_id: RESOURCE_ID.to_string(),
        plan_id: PLAN_ID.to_string(),
        resource_instance_id: format!("memory:{}", event.app_guid),
        measures: vec![
            Measure {
                measure: MEASURE_INSTANCE_MEMORY.to_string(),
                quantity: memory,
            },
            Measure {
                measure: MEASURE_RUNNING_INSTANCES.to_string(),
                quantity: instances,
            },
        ],
    }
}
