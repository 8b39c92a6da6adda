use reqwest::StatusCode;

/// Upstream error code returned when an `after_guid` filter names an event the
/// source no longer retains.
pub const GUID_NOT_FOUND_CODE: u64 = 10005;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}: {body}")]
    Http {
        status: StatusCode,
        url: String,
        body: String,
    },
    #[error("invalid page from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// True when the source rejected the request because it has forgotten the
    /// requested cursor.
    pub fn is_guid_not_found(&self) -> bool {
        let Self::Http { status, body, .. } = self else {
            return false;
        };
        if *status != StatusCode::BAD_REQUEST {
            return false;
        }
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| value.get("code").and_then(|code| code.as_u64()))
            == Some(GUID_NOT_FOUND_CODE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("collector responded {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("no collector token available")]
    MissingToken,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError<E> {
    #[error("no source token available")]
    MissingToken,
    #[error("walk cancelled")]
    Cancelled,
    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),
    #[error("processing resource {guid} failed: {error}")]
    Resource {
        guid: String,
        #[source]
        error: E,
    },
}

/// Fatal bridge errors. Anything here stops every loop.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("db error: {0}")]
    Db(#[from] bridge_db::DbError),
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: StatusCode, body: &str) -> FetchError {
        FetchError::Http {
            status,
            url: "http://cf/v2/app_usage_events".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn guid_not_found_requires_bad_request_and_code() {
        let not_found = http(
            StatusCode::BAD_REQUEST,
            r#"{"code":10005,"description":"Invalid after_guid"}"#,
        );
        assert!(not_found.is_guid_not_found());
        assert!(!http(StatusCode::BAD_REQUEST, r#"{"code":10001}"#).is_guid_not_found());
        assert!(!http(StatusCode::BAD_REQUEST, "not json").is_guid_not_found());
        assert!(!http(StatusCode::INTERNAL_SERVER_ERROR, r#"{"code":10005}"#).is_guid_not_found());
        assert!(!FetchError::InvalidUrl("x".to_string()).is_guid_not_found());
    }
}
