use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bridge_core::{AppState, AppUsageEvent};
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::stats::PerfCounters;
use crate::token::TokenProvider;
use crate::types::{FetchError, WalkError};

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub guid: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource<T> {
    pub metadata: Metadata,
    pub entity: T,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next_url: Option<String>,
    #[serde(default = "Vec::new")]
    resources: Vec<Resource<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppUsageEntity {
    pub state: AppState,
    #[serde(default)]
    pub memory_in_mb_per_instance: u64,
    #[serde(default)]
    pub instance_count: u64,
    pub app_guid: String,
    #[serde(default)]
    pub app_name: Option<String>,
    pub space_guid: String,
    #[serde(default)]
    pub space_name: Option<String>,
    pub org_guid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppEntity {
    #[serde(default)]
    pub name: Option<String>,
    pub state: AppState,
}

impl From<Resource<AppUsageEntity>> for AppUsageEvent {
    fn from(resource: Resource<AppUsageEntity>) -> Self {
        let Resource { metadata, entity } = resource;
        AppUsageEvent {
            guid: metadata.guid,
            created_at: metadata.created_at,
            app_guid: entity.app_guid,
            app_name: entity.app_name,
            org_id: entity.org_guid,
            space_id: entity.space_guid,
            space_name: entity.space_name,
            memory_mb_per_instance: entity.memory_in_mb_per_instance,
            instance_count: entity.instance_count,
            state: entity.state,
        }
    }
}

pub fn events_uri(after_guid: Option<&str>, page_size: u32) -> String {
    let mut uri =
        format!("/v2/app_usage_events?order-direction=asc&results-per-page={page_size}");
    if let Some(guid) = after_guid {
        uri.push_str("&after_guid=");
        uri.push_str(guid);
    }
    uri
}

pub fn apps_uri(page_size: u32) -> String {
    format!("/v2/apps?results-per-page={page_size}")
}

#[async_trait]
pub trait ResourceVisitor<T: Send + 'static>: Send {
    type Error: Send;

    async fn visit(&mut self, resource: Resource<T>) -> Result<(), Self::Error>;
}

#[derive(Clone)]
pub struct PageReader {
    client: reqwest::Client,
    api: Url,
    auth: Option<Arc<dyn TokenProvider>>,
    perf: Arc<PerfCounters>,
    cancel: CancellationToken,
}

impl PageReader {
    pub fn new(
        client: reqwest::Client,
        api: Url,
        auth: Option<Arc<dyn TokenProvider>>,
        perf: Arc<PerfCounters>,
    ) -> Self {
        Self {
            client,
            api: with_trailing_slash(&api),
            auth,
            perf,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops walks between pages once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Visits every resource reachable from `uri` in page order. The next page
    /// is fetched only after every resource of the current one was visited;
    /// the first visitor error or a cancellation stops the walk.
    pub async fn walk<T, V>(&self, uri: &str, visitor: &mut V) -> Result<(), WalkError<V::Error>>
    where
        T: DeserializeOwned + Send + 'static,
        V: ResourceVisitor<T>,
    {
        let mut next = Some(uri.to_string());
        while let Some(uri) = next.take() {
            if self.cancel.is_cancelled() {
                return Err(WalkError::Cancelled);
            }
            let token = match &self.auth {
                Some(auth) => match auth.bearer_token() {
                    Some(token) => Some(token),
                    None => return Err(WalkError::MissingToken),
                },
                None => None,
            };
            let page: Page<T> = self
                .fetch_page(&uri, token.as_deref())
                .await
                .map_err(WalkError::Fetch)?;
            debug!(%uri, resources = page.resources.len(), "fetched page");
            for resource in page.resources {
                let guid = resource.metadata.guid.clone();
                visitor
                    .visit(resource)
                    .await
                    .map_err(|error| WalkError::Resource { guid, error })?;
            }
            next = page.next_url.filter(|url| !url.is_empty());
        }
        Ok(())
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        uri: &str,
        token: Option<&str>,
    ) -> Result<Page<T>, FetchError> {
        let url = page_url(&self.api, uri)?;
        let started = Instant::now();
        let result = self.send(url, token).await;
        self.perf.record("page.fetch", started, result.is_ok());
        if let Err(err) = &result {
            warn!(%uri, error = %err, "page fetch failed");
        }
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: Url,
        token: Option<&str>,
    ) -> Result<Page<T>, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(FetchError::Http {
                status,
                url: url.to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

/// Appends a trailing slash so joins keep the base path.
pub(crate) fn with_trailing_slash(url: &Url) -> Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn page_url(api: &Url, uri: &str) -> Result<Url, FetchError> {
    api.join(uri.trim_start_matches('/'))
        .map_err(|err| FetchError::InvalidUrl(format!("{uri}: {err}")))
}
