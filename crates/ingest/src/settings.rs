use std::collections::HashSet;
use std::time::Duration;

use reqwest::Url;

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub api: Url,
    pub collector: Url,
    pub min_interval: u64,
    pub max_interval: u64,
    pub guid_min_age: Duration,
    pub scan_retry_interval: Duration,
    pub page_size: u32,
    pub orgs_to_report: OrgFilter,
}

impl BridgeSettings {
    /// The cursor cache is flushed twice as rarely as the fastest poll.
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.min_interval.saturating_mul(2))
    }

    pub fn guid_min_age_delta(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.guid_min_age.as_millis().min(i64::MAX as u128) as i64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrgFilter {
    orgs: Option<HashSet<String>>,
}

impl OrgFilter {
    pub fn all() -> Self {
        Self { orgs: None }
    }

    pub fn only<I, S>(orgs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            orgs: Some(orgs.into_iter().map(Into::into).collect()),
        }
    }

    pub fn reports(&self, org_id: &str) -> bool {
        self.orgs.as_ref().is_none_or(|orgs| orgs.contains(org_id))
    }

    pub fn orgs(&self) -> Option<Vec<String>> {
        self.orgs.as_ref().map(|orgs| {
            let mut list: Vec<String> = orgs.iter().cloned().collect();
            list.sort();
            list
        })
    }
}
