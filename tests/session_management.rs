//! Session load, persist, and external-site pruning.

mod common;

use std::sync::Arc;

use common::{element, envelope, RecordingApi};
use serde_json::json;
use zapdriver::domain::models::config::SessionMode;
use zapdriver::domain::ports::control_api::ApiError;
use zapdriver::services::session::SessionService;

#[tokio::test]
async fn load_mode_issues_load_session_and_never_saves() {
    let api = Arc::new(RecordingApi::always_ok());
    let service = SessionService::new(api.clone());
    let mode = SessionMode::Load {
        path: "/sessions/previous.session".into(),
    };

    service.start(&mode).await.unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let (session_path, clean) = service.finish(&mode, workspace.path()).await.unwrap();

    assert!(clean);
    assert!(session_path.is_none());
    assert_eq!(api.count("core", "loadSession"), 1);
    assert_eq!(api.count("core", "saveSession"), 0);
    let load = &api.calls()[0];
    assert!(load
        .params
        .contains(&("name".into(), "/sessions/previous.session".into())));
}

#[tokio::test]
async fn persist_mode_saves_with_overwrite_under_the_workspace() {
    let api = Arc::new(RecordingApi::always_ok());
    let service = SessionService::new(api.clone());
    let mode = SessionMode::Persist {
        filename: "nightly".into(),
        prune_external_sites: false,
        internal_sites: String::new(),
    };

    service.start(&mode).await.unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let (session_path, clean) = service.finish(&mode, workspace.path()).await.unwrap();

    assert!(clean);
    let expected = workspace.path().join("nightly.session");
    assert_eq!(session_path.as_deref(), Some(expected.as_path()));
    assert_eq!(api.count("core", "loadSession"), 0);
    let save = api
        .calls()
        .into_iter()
        .find(|c| c.method == "saveSession")
        .unwrap();
    assert!(save.params.contains(&("overwrite".into(), "true".into())));
}

#[tokio::test]
async fn prune_deletes_only_external_sites() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("core", "sites") => Ok(envelope(json!({
                "sites": ["https://example.com", "https://tracker.ads.net", "https://api.example.com"]
            }))),
            _ => Ok(element("OK")),
        }
    }));
    let service = SessionService::new(api.clone());
    let mode = SessionMode::Persist {
        filename: "nightly".into(),
        prune_external_sites: true,
        internal_sites: "example.com\n".into(),
    };

    let workspace = tempfile::tempdir().unwrap();
    let (_, clean) = service.finish(&mode, workspace.path()).await.unwrap();

    assert!(clean);
    assert_eq!(api.count("core", "deleteSiteNode"), 1);
    let delete = api
        .calls()
        .into_iter()
        .find(|c| c.method == "deleteSiteNode")
        .unwrap();
    assert!(delete
        .params
        .contains(&("url".into(), "https://tracker.ads.net".into())));
}

#[tokio::test]
async fn failed_deletion_stops_the_prune_and_flips_clean() {
    let api = Arc::new(RecordingApi::new(|component, method, _| {
        match (component, method) {
            ("core", "sites") => Ok(envelope(json!({
                "sites": ["https://a.ads.net", "https://b.ads.net"]
            }))),
            ("core", "deleteSiteNode") => Err(ApiError::Rejected {
                component: component.to_string(),
                method: method.to_string(),
                message: "busy".into(),
            }),
            _ => Ok(element("OK")),
        }
    }));
    let service = SessionService::new(api.clone());
    let mode = SessionMode::Persist {
        filename: "nightly".into(),
        prune_external_sites: true,
        internal_sites: "example.com".into(),
    };

    let workspace = tempfile::tempdir().unwrap();
    let (session_path, clean) = service.finish(&mode, workspace.path()).await.unwrap();

    assert!(!clean);
    // First failure stops the loop; the second site is never attempted.
    assert_eq!(api.count("core", "deleteSiteNode"), 1);
    // The session is still persisted.
    assert!(session_path.is_some());
    assert_eq!(api.count("core", "saveSession"), 1);
}
