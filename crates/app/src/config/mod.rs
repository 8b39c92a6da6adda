use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ingest::{BridgeAuth, BridgeSettings, OrgFilter, StaticToken, TokenProvider};
use reqwest::Url;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::startup::AppPaths;

const DEFAULT_API: &str = "http://localhost:9882";
const DEFAULT_COLLECTOR: &str = "http://localhost:9080";
const DEFAULT_MIN_INTERVAL: u64 = 1000;
const DEFAULT_MAX_INTERVAL: u64 = 240_000;
const DEFAULT_GUID_MIN_AGE: u64 = 60_000;
const DEFAULT_SCAN_RETRY_INTERVAL: u64 = 5000;
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_DATA_DIR: &str = "./data";

/// Bridge configuration read from the process environment.
#[derive(Clone)]
pub struct AppConfig {
    pub api: Url,
    pub collector: Url,
    pub secured: bool,
    pub cf_token: Option<String>,
    pub system_token: Option<String>,
    pub min_interval: u64,
    pub max_interval: u64,
    pub guid_min_age: u64,
    pub scan_retry_interval: u64,
    pub page_size: u32,
    pub orgs_to_report: Option<Vec<String>>,
    pub data_dir: PathBuf,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api", &self.api.as_str())
            .field("collector", &self.collector.as_str())
            .field("secured", &self.secured)
            .field("cf_token", &self.cf_token.as_ref().map(|_| "<redacted>"))
            .field("system_token", &self.system_token.as_ref().map(|_| "<redacted>"))
            .field("min_interval", &self.min_interval)
            .field("max_interval", &self.max_interval)
            .field("guid_min_age", &self.guid_min_age)
            .field("scan_retry_interval", &self.scan_retry_interval)
            .field("page_size", &self.page_size)
            .field("orgs_to_report", &self.orgs_to_report)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Configuration as shown on the diagnostic endpoint. Tokens are reduced to
/// presence flags.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub api: String,
    pub collector: String,
    pub secured: bool,
    pub cf_token_present: bool,
    pub system_token_present: bool,
    pub min_interval: u64,
    pub max_interval: u64,
    pub guid_min_age: u64,
    pub scan_retry_interval: u64,
    pub page_size: u32,
    pub orgs_to_report: Option<Vec<String>>,
    pub data_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let api = parse_url("API", get("API").unwrap_or(DEFAULT_API))?;
        let collector = parse_url("COLLECTOR", get("COLLECTOR").unwrap_or(DEFAULT_COLLECTOR))?;
        let secured = match get("SECURED") {
            None => false,
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            Some(value) => {
                return Err(AppError::Config(format!(
                    "SECURED must be true or false, got {value}"
                )));
            }
        };
        let cf_token = get("CF_TOKEN").map(str::to_string);
        let system_token = get("SYSTEM_TOKEN").map(str::to_string);
        let min_interval =
            parse_number("MIN_INTERVAL", get("MIN_INTERVAL"), DEFAULT_MIN_INTERVAL)?;
        let max_interval =
            parse_number("MAX_INTERVAL", get("MAX_INTERVAL"), DEFAULT_MAX_INTERVAL)?;
        let guid_min_age =
            parse_number("GUID_MIN_AGE", get("GUID_MIN_AGE"), DEFAULT_GUID_MIN_AGE)?;
        let scan_retry_interval = parse_number(
            "SCAN_RETRY_INTERVAL",
            get("SCAN_RETRY_INTERVAL"),
            DEFAULT_SCAN_RETRY_INTERVAL,
        )?;
        let page_size = parse_number("PAGE_SIZE", get("PAGE_SIZE"), DEFAULT_PAGE_SIZE)?;
        let orgs_to_report = get("ORGS_TO_REPORT").map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|org| !org.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        let orgs_to_report = orgs_to_report.filter(|orgs| !orgs.is_empty());
        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or(DEFAULT_DATA_DIR));

        if max_interval == 0 {
            return Err(AppError::Config("MAX_INTERVAL must be positive".to_string()));
        }
        if min_interval > max_interval {
            return Err(AppError::Config(format!(
                "MIN_INTERVAL ({min_interval}) exceeds MAX_INTERVAL ({max_interval})"
            )));
        }
        if page_size == 0 {
            return Err(AppError::Config("PAGE_SIZE must be positive".to_string()));
        }
        if secured {
            let missing: Vec<&str> = [("CF_TOKEN", &cf_token), ("SYSTEM_TOKEN", &system_token)]
                .into_iter()
                .filter(|(_, token)| token.is_none())
                .map(|(key, _)| key)
                .collect();
            if !missing.is_empty() {
                return Err(AppError::Config(format!(
                    "secured mode requires {}",
                    missing.join(" and ")
                )));
            }
        }

        Ok(Self {
            api,
            collector,
            secured,
            cf_token,
            system_token,
            min_interval,
            max_interval,
            guid_min_age,
            scan_retry_interval,
            page_size,
            orgs_to_report,
            data_dir,
        })
    }

    pub fn paths(&self) -> AppPaths {
        AppPaths::new(self.data_dir.clone())
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        let orgs_to_report = match &self.orgs_to_report {
            Some(orgs) => OrgFilter::only(orgs.iter().cloned()),
            None => OrgFilter::all(),
        };
        BridgeSettings {
            api: self.api.clone(),
            collector: self.collector.clone(),
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            guid_min_age: Duration::from_millis(self.guid_min_age),
            scan_retry_interval: Duration::from_millis(self.scan_retry_interval),
            page_size: self.page_size,
            orgs_to_report,
        }
    }

    /// Outside secured mode requests carry no `Authorization` header at all.
    pub fn bridge_auth(&self) -> BridgeAuth {
        if !self.secured {
            return BridgeAuth::default();
        }
        BridgeAuth {
            source: Some(token(&self.cf_token)),
            system: Some(token(&self.system_token)),
        }
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            api: self.api.to_string(),
            collector: self.collector.to_string(),
            secured: self.secured,
            cf_token_present: self.cf_token.is_some(),
            system_token_present: self.system_token.is_some(),
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            guid_min_age: self.guid_min_age,
            scan_retry_interval: self.scan_retry_interval,
            page_size: self.page_size,
            orgs_to_report: self.orgs_to_report.clone(),
            data_dir: self.data_dir.display().to_string(),
        }
    }
}

fn token(value: &Option<String>) -> Arc<dyn TokenProvider> {
    Arc::new(StaticToken::new(value.clone()))
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|err| AppError::Config(format!("{key} is not a valid url ({value}): {err}")))
}

fn parse_number<T: FromStr>(key: &str, value: Option<&str>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            AppError::Config(format!("{key} must be a non-negative integer, got {raw}"))
        }),
    }
}
