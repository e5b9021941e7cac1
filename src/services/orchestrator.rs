//! End-to-end scan pipeline.
//!
//! Order: launch the daemon, wait for readiness, load or prepare the
//! session, configure context and authentication, run the scan phases,
//! report housekeeping, generate reports, push tracker issues, tally
//! alerts, persist the session, write the handoff record, and shut the
//! daemon down. Shutdown always runs, even when an earlier step failed,
//! and its own failure never masks that earlier failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::domain::cancel::CancelToken;
use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::alert::AlertCounts;
use crate::domain::models::config::{ReportMethod, ScanConfig};
use crate::domain::models::handoff::HandoffRecord;
use crate::domain::ports::control_api::{ApiCategory, ControlApi};
use crate::domain::ports::host::HostExecutor;
use crate::infrastructure::api::ZapClient;
use crate::infrastructure::process::{launch, resolve_install_dir, wait_until_ready};
use crate::services::alert_filters;
use crate::services::alerts;
use crate::services::context::ContextService;
use crate::services::phases::{PhaseRunner, ScanEvent};
use crate::services::reports::ReportService;
use crate::services::session::SessionService;

/// Result of the scan step, as recorded in the handoff.
#[derive(Debug)]
pub struct ScanOutcome {
    pub build_success: bool,
    pub counts: AlertCounts,
    pub handoff_path: PathBuf,
}

pub struct Orchestrator {
    host: Arc<dyn HostExecutor>,
    config: ScanConfig,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl Orchestrator {
    pub fn new(
        host: Arc<dyn HostExecutor>,
        config: ScanConfig,
        events: Option<mpsc::UnboundedSender<ScanEvent>>,
    ) -> Self {
        Self {
            host,
            config,
            events,
        }
    }

    /// Launch the scanner and drive the full pipeline against it.
    ///
    /// Consumes the orchestrator so the event sender closes when the run
    /// ends and a draining renderer sees the channel finish.
    pub async fn run(self, cancel: &mut CancelToken) -> ScanResult<ScanOutcome> {
        let install_dir = resolve_install_dir(&self.config, self.host.as_ref())?;
        let scanner = &self.config.scanner;

        let mut process = launch(&install_dir, scanner, self.host.as_ref())?;

        let ready = wait_until_ready(
            self.host.as_ref(),
            &scanner.host,
            scanner.port,
            scanner.startup_timeout_secs,
            cancel,
        )
        .await;
        if let Err(e) = ready {
            // The daemon never came up; reap it before surfacing the error.
            let _ = process
                .shutdown_join(Duration::from_secs(5))
                .await;
            return Err(e);
        }

        let api: Arc<dyn ControlApi> = Arc::new(ZapClient::new(&scanner.host, scanner.port)?);

        let driven = self.run_with_api(Arc::clone(&api), cancel).await;

        // Finally-equivalent: always ask the daemon to shut down and join
        // the process, whatever the pipeline did.
        let shutdown_clean = Self::shutdown(
            api.as_ref(),
            &mut process,
            Duration::from_secs(scanner.shutdown_join_secs),
        )
        .await;

        let (pipeline_clean, session_path, counts) = match driven {
            Ok((clean, session_path, counts)) => (clean, session_path, counts),
            Err(e) => {
                error!(error = %e, "scan pipeline failed");
                // A failed handoff write must not mask the pipeline error.
                if let Err(write_err) = self.write_handoff(&install_dir, false, None).await {
                    warn!(error = %write_err, "failed to write handoff record");
                }
                return Err(e);
            }
        };

        let build_success = pipeline_clean && shutdown_clean;
        let handoff_path = self
            .write_handoff(&install_dir, build_success, session_path)
            .await?;

        Ok(ScanOutcome {
            build_success,
            counts,
            handoff_path,
        })
    }

    /// Everything between readiness and shutdown, against an already-ready
    /// scanner. Returns the soft-failure flag, the persisted session path,
    /// and the deduplicated alert tally.
    pub async fn run_with_api(
        &self,
        api: Arc<dyn ControlApi>,
        cancel: &mut CancelToken,
    ) -> ScanResult<(bool, Option<PathBuf>, AlertCounts)> {
        let mut clean = true;

        let sessions = SessionService::new(Arc::clone(&api));
        sessions.start(&self.config.session).await?;

        let filter_file = self.load_filter_file().await?;
        let contexts = ContextService::new(Arc::clone(&api));
        let ids = contexts
            .configure(
                &self.config.context,
                self.config.auth.as_ref(),
                self.config.scanner.settings_dir.as_deref(),
                filter_file
                    .as_ref()
                    .map(|(path, content)| (path.as_path(), content.clone())),
            )
            .await?;
        clean &= ids.clean;

        let phases = PhaseRunner::new(
            Arc::clone(&api),
            self.config.phases.clone(),
            self.events.clone(),
        );
        phases
            .run_all(&self.config.target_url, &self.config.context.name, &ids, cancel)
            .await?;

        let report_service = ReportService::new(Arc::clone(&api), Arc::clone(&self.host));
        if let Some(reports) = &self.config.reports {
            let formats = match &reports.method {
                ReportMethod::Builtin { formats } | ReportMethod::Export { formats, .. } => {
                    formats.clone()
                }
            };
            if reports.delete_stale {
                report_service
                    .delete_stale_reports(&self.config.workspace, &reports.filename, &formats)
                    .await?;
            }
            clean &= report_service
                .generate(&self.config.workspace, &reports.filename, &reports.method)
                .await?;
        }

        if let Some(tracker) = &self.config.tracker {
            report_service.create_tracker_issues(tracker).await;
        }

        let counts = alerts::fetch_alert_counts(api.as_ref()).await?;
        info!(
            high = counts.high,
            medium = counts.medium,
            low = counts.low,
            informational = counts.informational,
            "alert summary"
        );

        let (session_path, session_clean) = sessions
            .finish(&self.config.session, &self.config.workspace)
            .await?;
        clean &= session_clean;

        Ok((clean, session_path, counts))
    }

    /// Read the alert-filter rule file named by the context config.
    async fn load_filter_file(&self) -> ScanResult<Option<(PathBuf, String)>> {
        let (Some(name), Some(settings_dir)) = (
            self.config.context.alert_filters.as_deref(),
            self.config.scanner.settings_dir.as_deref(),
        ) else {
            return Ok(None);
        };
        let path = alert_filters::rule_file_path(settings_dir, name);
        let bytes = self
            .host
            .read_file(&path)
            .await
            .map_err(|e| ScanError::io(path.clone(), e))?;
        let content = String::from_utf8(bytes).map_err(|e| ScanError::AlertFilterParse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some((path, content)))
    }

    /// Ask the daemon to shut down, then join the process with a bounded
    /// wait. Returns false when either step failed.
    async fn shutdown(
        api: &dyn ControlApi,
        process: &mut crate::infrastructure::process::ScannerProcess,
        join_deadline: Duration,
    ) -> bool {
        let mut clean = true;
        info!("shutting down scanner");
        if let Err(e) = api
            .call("core", ApiCategory::Action, "shutdown", &[])
            .await
        {
            warn!(error = %e, "shutdown action failed");
            clean = false;
        }
        if let Err(e) = process.shutdown_join(join_deadline).await {
            warn!(error = %e, "scanner process join failed");
            clean = false;
        }
        clean
    }

    async fn write_handoff(
        &self,
        install_dir: &str,
        build_success: bool,
        session_path: Option<PathBuf>,
    ) -> ScanResult<PathBuf> {
        let record = HandoffRecord {
            build_success,
            install_dir: install_dir.to_string(),
            host: self.config.scanner.host.clone(),
            port: self.config.scanner.port,
            auto_install: self.config.scanner.auto_install,
            tool_name: self.config.scanner.tool_name.clone(),
            extra_args: self.config.scanner.extra_args.clone(),
            env: self.config.scanner.env.clone(),
            session_path: session_path.map(|p| p.to_string_lossy().into_owned()),
            created_at: Utc::now(),
        };
        let path = HandoffRecord::path_in(&self.config.workspace);
        if let Some(parent) = path.parent() {
            self.host
                .create_dir_all(parent)
                .await
                .map_err(|e| ScanError::io(parent.to_path_buf(), e))?;
        }
        self.host
            .write_file(&path, &record.to_json()?)
            .await
            .map_err(|e| ScanError::io(path.clone(), e))?;
        info!(path = %path.display(), build_success, "handoff record written");
        Ok(path)
    }
}

/// Read the handoff record the scan step left behind.
pub async fn read_handoff(
    host: &dyn HostExecutor,
    workspace: &std::path::Path,
) -> ScanResult<HandoffRecord> {
    let path = HandoffRecord::path_in(workspace);
    let bytes = match host.read_file(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::HandoffMissing(path));
        }
        Err(e) => return Err(ScanError::io(path, e)),
    };
    HandoffRecord::from_json(&path, &bytes)
}
