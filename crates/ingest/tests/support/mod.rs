#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_core::CursorState;
use bridge_db::DbError;
use chrono::{SecondsFormat, Utc};
use ingest::{
    BridgeSettings, BridgeStats, CursorCache, CursorStore, OrgFilter, PageReader, PerfCounters,
    StaticToken, TokenProvider, UsageReporter,
};
use reqwest::Url;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const EVENTS_PATH: &str = "/v2/app_usage_events";
pub const APPS_PATH: &str = "/v2/apps";
pub const COLLECTOR_PATH: &str = "/v1/metering/collected/usage";

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<Option<CursorState>>,
}

impl CursorStore for MemoryStore {
    fn load(&self) -> Result<Option<CursorState>, DbError> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, state: &CursorState) -> Result<String, DbError> {
        *self.state.lock().unwrap() = Some(state.clone());
        Ok("1-memory".to_string())
    }
}

pub struct Harness {
    pub server: MockServer,
    pub settings: BridgeSettings,
    pub stats: Arc<BridgeStats>,
    pub perf: Arc<PerfCounters>,
    pub cache: Arc<CursorCache>,
    pub reader: PageReader,
    pub reporter: Arc<UsageReporter>,
}

pub async fn harness() -> Harness {
    harness_with(OrgFilter::all(), None).await
}

pub async fn harness_with(orgs: OrgFilter, cursor: Option<CursorState>) -> Harness {
    build(orgs, cursor, None, None).await
}

/// Secured harness; `None` makes the matching provider yield no token.
pub async fn harness_with_tokens(source: Option<&str>, system: Option<&str>) -> Harness {
    build(
        OrgFilter::all(),
        None,
        Some(token(source)),
        Some(token(system)),
    )
    .await
}

fn token(value: Option<&str>) -> Arc<dyn TokenProvider> {
    Arc::new(StaticToken::new(value.map(str::to_string)))
}

async fn build(
    orgs: OrgFilter,
    cursor: Option<CursorState>,
    source: Option<Arc<dyn TokenProvider>>,
    system: Option<Arc<dyn TokenProvider>>,
) -> Harness {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let settings = BridgeSettings {
        api: base.clone(),
        collector: base,
        min_interval: 10,
        max_interval: 1000,
        guid_min_age: Duration::from_secs(60),
        scan_retry_interval: Duration::from_millis(10),
        page_size: 50,
        orgs_to_report: orgs,
    };
    let stats = Arc::new(BridgeStats::default());
    let perf = Arc::new(PerfCounters::default());
    let store = Arc::new(MemoryStore {
        state: Mutex::new(cursor),
    });
    let cache = Arc::new(
        CursorCache::load(store, stats.clone(), perf.clone())
            .await
            .unwrap(),
    );
    let client = reqwest::Client::new();
    let reader = PageReader::new(client.clone(), settings.api.clone(), source, perf.clone());
    let reporter = Arc::new(UsageReporter::new(
        client,
        &settings.collector,
        system,
        perf.clone(),
    ));
    Harness {
        server,
        settings,
        stats,
        perf,
        cache,
        reader,
        reporter,
    }
}

impl Harness {
    pub async fn serve_events(&self, resources: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(resources, None)))
            .mount(&self.server)
            .await;
    }

    pub async fn collector_status(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(COLLECTOR_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn requests_to(&self, target: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == target)
            .collect()
    }

    pub async fn reports(&self) -> Vec<Value> {
        self.requests_to(COLLECTOR_PATH)
            .await
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }
}

pub fn page(resources: Vec<Value>, next_url: Option<&str>) -> Value {
    json!({
        "total_results": resources.len(),
        "next_url": next_url,
        "resources": resources,
    })
}

pub fn usage_event(guid: &str, age: chrono::Duration, state: &str, app: &str, org: &str) -> Value {
    let created_at = (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Millis, true);
    json!({
        "metadata": {
            "guid": guid,
            "url": format!("/v2/app_usage_events/{guid}"),
            "created_at": created_at,
        },
        "entity": {
            "state": state,
            "memory_in_mb_per_instance": 512,
            "instance_count": 2,
            "app_guid": app,
            "app_name": "web",
            "space_guid": "space-1",
            "space_name": "dev",
            "org_guid": org,
        }
    })
}

pub fn app(guid: &str, state: &str) -> Value {
    json!({
        "metadata": {"guid": guid, "created_at": "2025-12-01T00:00:00Z"},
        "entity": {"name": guid, "state": state}
    })
}

pub fn old() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

pub fn young() -> chrono::Duration {
    chrono::Duration::seconds(30)
}
