//! Post-build verdict step.
//!
//! Runs as a separate process after the scan step. It relaunches the
//! scanner from the handoff record, reloads the persisted session, tallies
//! the alerts, and maps them through the threshold engine to the tri-state
//! verdict. A failed scan step fails the verdict outright regardless of
//! alert counts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::cancel::CancelToken;
use crate::domain::errors::ScanResult;
use crate::domain::models::alert::AlertCounts;
use crate::domain::models::config::{ScannerConfig, ThresholdConfig};
use crate::domain::ports::control_api::{ApiCategory, ControlApi};
use crate::domain::ports::host::HostExecutor;
use crate::infrastructure::api::ZapClient;
use crate::infrastructure::process::{launch, wait_until_ready};
use crate::services::orchestrator::read_handoff;
use crate::services::thresholds::{evaluate, Evaluation, Verdict};
use crate::services::alerts;

#[derive(Debug)]
pub struct VerdictOutcome {
    pub verdict: Verdict,
    pub evaluation: Evaluation,
    pub counts: AlertCounts,
    /// Whether the scan step itself finished clean.
    pub scan_build_success: bool,
}

/// Drive the whole verdict step against the workspace's handoff record.
pub async fn run_verdict(
    host: Arc<dyn HostExecutor>,
    workspace: &Path,
    thresholds: &ThresholdConfig,
    startup_timeout_secs: u64,
    cancel: &mut CancelToken,
) -> ScanResult<VerdictOutcome> {
    let record = read_handoff(host.as_ref(), workspace).await?;
    info!(
        install_dir = %record.install_dir,
        host = %record.host,
        port = record.port,
        scan_build_success = record.build_success,
        "handoff record loaded"
    );

    let scanner = ScannerConfig {
        install_dir: Some(record.install_dir.clone()),
        host: record.host.clone(),
        port: record.port,
        startup_timeout_secs,
        extra_args: record.extra_args.clone(),
        env: record.env.clone(),
        ..Default::default()
    };

    let mut process = launch(&record.install_dir, &scanner, host.as_ref())?;
    let ready = wait_until_ready(
        host.as_ref(),
        &scanner.host,
        scanner.port,
        startup_timeout_secs,
        cancel,
    )
    .await;
    if let Err(e) = ready {
        let _ = process.shutdown_join(Duration::from_secs(5)).await;
        return Err(e);
    }

    let api: Arc<dyn ControlApi> = Arc::new(ZapClient::new(&scanner.host, scanner.port)?);

    let tallied = tally(api.as_ref(), record.session_path.as_deref()).await;

    // Shut down before surfacing any error so the daemon never outlives
    // the verdict step.
    if let Err(e) = api.call("core", ApiCategory::Action, "shutdown", &[]).await {
        warn!(error = %e, "shutdown action failed");
    }
    if let Err(e) = process.shutdown_join(Duration::from_secs(60)).await {
        warn!(error = %e, "scanner process join failed");
    }

    let counts = tallied?;
    let evaluation = evaluate(thresholds, &counts);
    let verdict = if record.build_success {
        evaluation.verdict
    } else {
        Verdict::Fail
    };

    Ok(VerdictOutcome {
        verdict,
        evaluation,
        counts,
        scan_build_success: record.build_success,
    })
}

async fn tally(api: &dyn ControlApi, session_path: Option<&str>) -> ScanResult<AlertCounts> {
    if let Some(path) = session_path {
        info!(path, "reloading persisted session");
        api.call(
            "core",
            ApiCategory::Action,
            "loadSession",
            &[("name", path.to_string())],
        )
        .await?;
    }
    alerts::fetch_alert_counts(api).await
}
