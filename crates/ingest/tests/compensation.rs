mod support;

use std::time::Duration;

use ingest::{CompensationLoop, LeadingAppsScan, OrgFilter, StartedApps};
use bridge_core::CursorState;
use serde_json::json;
use support::{
    APPS_PATH, EVENTS_PATH, Harness, app, harness, harness_with, harness_with_tokens, old, page,
    usage_event,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn compensation(h: &Harness, started: &StartedApps) -> CompensationLoop {
    CompensationLoop::new(
        &h.settings,
        h.reader.clone(),
        h.reporter.clone(),
        h.cache.clone(),
        h.stats.clone(),
        started.clone(),
    )
}

#[tokio::test]
async fn started_event_for_absent_app_gets_forced_stop() {
    let h = harness().await;
    h.serve_events(vec![
        usage_event("e1", old(), "STARTED", "gone", "o1"),
        usage_event("e2", old(), "STARTED", "live", "o1"),
        usage_event("e3", old(), "STOPPED", "other", "o1"),
    ])
    .await;
    h.collector_status(201).await;
    let started = StartedApps::default();
    started.insert("live");
    started.mark_ready();
    let mut compensation = compensation(&h, &started);

    compensation.tick().await;

    let reports = h.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["consumer_id"], "app:gone");
    assert_eq!(reports[0]["measured_usage"][0]["quantity"], 0);
    assert_eq!(reports[0]["measured_usage"][1]["quantity"], 0);
    assert_eq!(h.stats.compensation.forced_stops.get(), 1);
    assert_eq!(h.stats.compensation.skipped_started.get(), 1);
    assert_eq!(h.cache.last_compensated_guid().as_deref(), Some("e3"));
    assert_eq!(h.cache.last_recorded_guid(), None);
}

#[tokio::test]
async fn failed_forced_stop_keeps_compensation_cursor() {
    let h = harness().await;
    h.serve_events(vec![
        usage_event("e1", old(), "STOPPED", "a0", "o1"),
        usage_event("e2", old(), "STARTED", "gone", "o1"),
    ])
    .await;
    h.collector_status(502).await;
    let started = StartedApps::default();
    started.mark_ready();
    let mut compensation = compensation(&h, &started);

    compensation.tick().await;

    assert_eq!(h.cache.last_compensated_guid().as_deref(), Some("e1"));
    assert_eq!(h.stats.compensation.loop_failures.get(), 1);
    assert_eq!(compensation.retry().current_retries, 1);
}

#[tokio::test]
async fn filtered_orgs_get_no_forced_stop() {
    let h = harness_with(OrgFilter::only(["o1"]), None).await;
    h.serve_events(vec![usage_event("e1", old(), "STARTED", "gone", "o2")])
        .await;
    h.collector_status(201).await;
    let started = StartedApps::default();
    started.mark_ready();
    let mut compensation = compensation(&h, &started);

    compensation.tick().await;

    assert!(h.reports().await.is_empty());
    assert_eq!(h.cache.last_compensated_guid().as_deref(), Some("e1"));
}

#[tokio::test]
async fn compensation_waits_for_the_scan() {
    let h = harness().await;
    h.serve_events(vec![]).await;
    let started = StartedApps::default();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(compensation(&h, &started).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.stats.compensation.loop_success.get(), 0);

    started.mark_ready();
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops")
        .expect("join");
    assert!(h.stats.compensation.loop_success.get() >= 1);
}

#[tokio::test]
async fn scan_collects_only_started_apps() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(APPS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![app("a1", "STARTED"), app("a2", "STOPPED")],
            None,
        )))
        .mount(&h.server)
        .await;
    let started = StartedApps::default();
    let scan = LeadingAppsScan::new(
        &h.settings,
        h.reader.clone(),
        started.clone(),
        h.stats.clone(),
    );

    scan.scan().await.expect("scan");

    assert!(started.contains("a1"));
    assert!(!started.contains("a2"));
    assert!(!started.is_ready());
}

#[tokio::test]
async fn scan_retries_until_it_succeeds() {
    let mut h = harness().await;
    h.settings.guid_min_age = Duration::ZERO;
    Mock::given(method("GET"))
        .and(path(APPS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![app("a1", "STARTED")],
            None,
        )))
        .mount(&h.server)
        .await;
    let started = StartedApps::default();
    let scan = LeadingAppsScan::new(
        &h.settings,
        h.reader.clone(),
        started.clone(),
        h.stats.clone(),
    );

    tokio::time::timeout(Duration::from_secs(5), scan.run(CancellationToken::new()))
        .await
        .expect("scan finishes");

    assert!(started.is_ready());
    assert!(started.contains("a1"));
    assert_eq!(h.stats.scan.attempts.get(), 2);
    assert_eq!(h.stats.scan.failures.get(), 1);
    assert_eq!(h.stats.scan.started_apps.get(), 1);
}

#[tokio::test]
async fn lost_compensated_guid_restarts_from_the_beginning() {
    let cursor = CursorState {
        last_recorded_guid: Some("kept".to_string()),
        last_compensated_guid: Some("gone".to_string()),
        ..CursorState::default()
    };
    let h = harness_with(OrgFilter::all(), Some(cursor)).await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("after_guid", "gone"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 10005,
            "description": "The after_guid filter was invalid",
            "error_code": "CF-BadQueryParameter"
        })))
        .mount(&h.server)
        .await;
    h.serve_events(vec![usage_event("e1", old(), "STARTED", "gone-app", "o1")])
        .await;
    h.collector_status(201).await;
    let started = StartedApps::default();
    started.mark_ready();
    let mut compensation = compensation(&h, &started);

    compensation.tick().await;
    assert_eq!(h.stats.compensation.guid_not_found.get(), 1);
    assert_eq!(h.stats.compensation.loop_failures.get(), 0);
    assert_eq!(compensation.retry().current_retries, 0);
    assert_eq!(h.cache.last_compensated_guid(), None);
    assert_eq!(h.cache.last_recorded_guid().as_deref(), Some("kept"));

    compensation.tick().await;
    let fetches = h.requests_to(EVENTS_PATH).await;
    assert_eq!(fetches.len(), 2);
    assert!(
        !fetches[1]
            .url
            .query_pairs()
            .any(|(k, _)| k == "after_guid")
    );
    assert_eq!(h.stats.compensation.forced_stops.get(), 1);
    assert_eq!(h.cache.last_compensated_guid().as_deref(), Some("e1"));
}

#[tokio::test]
async fn missing_tokens_postpone_compensation_without_fetching() {
    let started = StartedApps::default();
    started.mark_ready();

    let h = harness_with_tokens(Some("cf-token"), None).await;
    h.serve_events(vec![usage_event("e1", old(), "STARTED", "gone", "o1")])
        .await;
    let mut compensation = compensation(&h, &started);
    compensation.tick().await;
    compensation.tick().await;
    assert_eq!(h.stats.compensation.missing_token.get(), 2);
    assert_eq!(compensation.retry().current_retries, 2);
    assert!(h.requests_to(EVENTS_PATH).await.is_empty());

    let h = harness_with_tokens(None, Some("system-token")).await;
    h.serve_events(vec![usage_event("e1", old(), "STARTED", "gone", "o1")])
        .await;
    let mut compensation = crate::compensation(&h, &started);
    compensation.tick().await;
    assert_eq!(h.stats.compensation.missing_token.get(), 1);
    assert_eq!(h.stats.compensation.loop_failures.get(), 0);
    assert_eq!(compensation.retry().current_retries, 1);
    assert!(h.requests_to(EVENTS_PATH).await.is_empty());
    assert_eq!(h.cache.last_compensated_guid(), None);
}
