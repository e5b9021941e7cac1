//! Phase runner behavior against a recorded API.

mod common;

use std::sync::Arc;

use common::{element, envelope, RecordingApi};
use serde_json::json;
use zapdriver::domain::cancel::CancelToken;
use zapdriver::domain::models::config::{
    ActiveScanConfig, AjaxSpiderConfig, PhasesConfig, SpiderConfig,
};
use zapdriver::services::context::ContextIds;
use zapdriver::services::phases::PhaseRunner;

fn ids_unauthenticated() -> ContextIds {
    ContextIds {
        context_id: "1".into(),
        user_id: None,
        clean: true,
    }
}

fn phases(
    spider: Option<SpiderConfig>,
    ajax: Option<AjaxSpiderConfig>,
    active: Option<ActiveScanConfig>,
) -> PhasesConfig {
    PhasesConfig {
        spider,
        ajax_spider: ajax,
        active_scan: active,
        poll_interval_secs: 5,
        phase_timeout_secs: None,
    }
}

#[tokio::test]
async fn disabled_phases_issue_no_calls() {
    let api = Arc::new(RecordingApi::always_ok());
    let runner = PhaseRunner::new(api.clone(), phases(None, None, None), None);
    let mut cancel = CancelToken::never();
    runner
        .run_all("https://example.com", "ci", &ids_unauthenticated(), &mut cancel)
        .await
        .unwrap();
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn spider_polls_until_one_hundred() {
    let api = Arc::new(RecordingApi::new(|component, method, nth| {
        match (component, method) {
            ("spider", "scan") => Ok(envelope(json!({"scan": "3"}))),
            ("spider", "status") => Ok(element(if nth == 0 { "40" } else { "100" })),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let runner = PhaseRunner::new(
        api.clone(),
        phases(Some(SpiderConfig::default()), None, None),
        None,
    );
    let mut cancel = CancelToken::never();
    runner
        .run_all("https://example.com", "ci", &ids_unauthenticated(), &mut cancel)
        .await
        .unwrap();

    assert_eq!(api.count("spider", "scan"), 1);
    assert_eq!(api.count("spider", "status"), 2);
    let start = &api.calls()[0];
    assert!(start.params.contains(&("url".into(), "https://example.com".into())));
    assert!(start.params.contains(&("contextName".into(), "ci".into())));
}

#[tokio::test(start_paused = true)]
async fn ajax_spider_stops_when_status_leaves_running() {
    let api = Arc::new(RecordingApi::new(|component, method, nth| {
        match (component, method) {
            ("ajaxSpider", "status") => Ok(element(if nth < 2 { "running" } else { "stopped" })),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let runner = PhaseRunner::new(
        api.clone(),
        phases(None, Some(AjaxSpiderConfig::default()), None),
        None,
    );
    let mut cancel = CancelToken::never();
    runner
        .run_all("https://example.com", "ci", &ids_unauthenticated(), &mut cancel)
        .await
        .unwrap();
    assert_eq!(api.count("ajaxSpider", "scan"), 1);
    assert_eq!(api.count("ajaxSpider", "status"), 3);
}

#[tokio::test(start_paused = true)]
async fn active_scan_runs_as_user_when_one_exists() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("ascan", "scanAsUser") => Ok(envelope(json!({"scan": "2"}))),
            ("ascan", "status") => Ok(element("100")),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let runner = PhaseRunner::new(
        api.clone(),
        phases(
            None,
            None,
            Some(ActiveScanConfig {
                recurse: true,
                policy: Some("API Policy".into()),
            }),
        ),
        None,
    );
    let ids = ContextIds {
        context_id: "1".into(),
        user_id: Some("7".into()),
        clean: true,
    };
    let mut cancel = CancelToken::never();
    runner
        .run_all("https://example.com", "ci", &ids, &mut cancel)
        .await
        .unwrap();

    assert_eq!(api.count("ascan", "scanAsUser"), 1);
    assert_eq!(api.count("ascan", "scan"), 0);
    let start = api
        .calls()
        .into_iter()
        .find(|c| c.method == "scanAsUser")
        .unwrap();
    assert!(start.params.contains(&("userId".into(), "7".into())));
    assert!(start.params.contains(&("scanPolicyName".into(), "API Policy".into())));
}

#[tokio::test(start_paused = true)]
async fn ajax_spider_never_runs_as_user() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("ajaxSpider", "status") => Ok(element("stopped")),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let runner = PhaseRunner::new(
        api.clone(),
        phases(None, Some(AjaxSpiderConfig::default()), None),
        None,
    );
    let ids = ContextIds {
        context_id: "1".into(),
        user_id: Some("7".into()),
        clean: true,
    };
    let mut cancel = CancelToken::never();
    runner
        .run_all("https://example.com", "ci", &ids, &mut cancel)
        .await
        .unwrap();
    let start = api
        .calls()
        .into_iter()
        .find(|c| c.component == "ajaxSpider" && c.method == "scan")
        .unwrap();
    assert!(start.params.iter().all(|(k, _)| k != "userId"));
}

#[tokio::test(start_paused = true)]
async fn phase_timeout_aborts_a_stuck_scan() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("spider", "scan") => Ok(envelope(json!({"scan": "3"}))),
            ("spider", "status") => Ok(element("10")),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let mut config = phases(Some(SpiderConfig::default()), None, None);
    config.phase_timeout_secs = Some(0);
    let runner = PhaseRunner::new(api, config, None);
    let mut cancel = CancelToken::never();
    let err = runner
        .run_all("https://example.com", "ci", &ids_unauthenticated(), &mut cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not finish"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_poll_sleep() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("spider", "scan") => Ok(envelope(json!({"scan": "3"}))),
            ("spider", "status") => Ok(element("10")),
            ("core", _) => Ok(element("0")),
            _ => Ok(element("OK")),
        }
    }));
    let runner = PhaseRunner::new(api, phases(Some(SpiderConfig::default()), None, None), None);
    let (handle, mut cancel) = CancelToken::new();
    handle.cancel();
    let err = runner
        .run_all("https://example.com", "ci", &ids_unauthenticated(), &mut cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, zapdriver::ScanError::Cancelled));
}
