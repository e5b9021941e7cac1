//! Report generation and defect-tracker notification.
//!
//! Built-in reports come back as raw bytes from the scanner's OTHER
//! surface and are written under `<workspace>/reports/`. The export add-on
//! renders server-side: we probe its advertised formats, then issue one
//! generate action per format. Tracker issue creation is a single
//! fire-and-forget action.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::config::{ReportMethod, TrackerConfig, REPORT_DIR};
use crate::domain::ports::control_api::{ApiCategory, ControlApi};
use crate::domain::ports::host::HostExecutor;

pub struct ReportService {
    api: Arc<dyn ControlApi>,
    host: Arc<dyn HostExecutor>,
}

/// Destination of one generated report.
pub fn report_path(workspace: &Path, filename: &str, format: &str) -> PathBuf {
    workspace.join(REPORT_DIR).join(format!("{filename}.{format}"))
}

impl ReportService {
    pub fn new(api: Arc<dyn ControlApi>, host: Arc<dyn HostExecutor>) -> Self {
        Self { api, host }
    }

    /// Remove previously generated reports matching the base filename and
    /// any of the selected formats, in both the workspace root and the
    /// report directory.
    pub async fn delete_stale_reports(
        &self,
        workspace: &Path,
        filename: &str,
        formats: &[String],
    ) -> ScanResult<()> {
        for dir in [workspace.to_path_buf(), workspace.join(REPORT_DIR)] {
            let entries = self
                .host
                .list_dir(&dir)
                .await
                .map_err(|e| ScanError::io(dir.clone(), e))?;
            for entry in entries {
                let stem = entry.file_stem().and_then(|s| s.to_str());
                let ext = entry.extension().and_then(|s| s.to_str());
                let (Some(stem), Some(ext)) = (stem, ext) else {
                    continue;
                };
                if stem == filename && formats.iter().any(|f| f == ext) {
                    info!(path = %entry.display(), "removing stale report");
                    self.host
                        .remove_file(&entry)
                        .await
                        .map_err(|e| ScanError::io(entry.clone(), e))?;
                }
            }
        }
        Ok(())
    }

    /// Generate the configured reports. Returns false when any format
    /// failed; generation continues across failures.
    pub async fn generate(
        &self,
        workspace: &Path,
        filename: &str,
        method: &ReportMethod,
    ) -> ScanResult<bool> {
        match method {
            ReportMethod::Builtin { formats } => {
                self.save_builtin(workspace, filename, formats).await
            }
            ReportMethod::Export { .. } => self.export(workspace, filename, method).await,
        }
    }

    /// One `core/<format>report` fetch per format, written to disk.
    /// A failed format is logged and skipped.
    async fn save_builtin(
        &self,
        workspace: &Path,
        filename: &str,
        formats: &[String],
    ) -> ScanResult<bool> {
        let report_dir = workspace.join(REPORT_DIR);
        self.host
            .create_dir_all(&report_dir)
            .await
            .map_err(|e| ScanError::io(report_dir.clone(), e))?;

        let mut clean = true;
        for format in formats {
            let dest = report_path(workspace, filename, format);
            let fetched = self
                .api
                .fetch_other("core", &format!("{format}report"), &[])
                .await;
            match fetched {
                Ok(bytes) => {
                    self.host
                        .write_file(&dest, &bytes)
                        .await
                        .map_err(|e| ScanError::io(dest.clone(), e))?;
                    info!(path = %dest.display(), bytes = bytes.len(), "report saved");
                }
                Err(e) => {
                    warn!(format, error = %e, "report generation failed, continuing");
                    clean = false;
                }
            }
        }
        Ok(clean)
    }

    /// Export add-on path: probe advertised formats, skip the rest, one
    /// generate call per valid format with a settle pause between calls.
    async fn export(
        &self,
        workspace: &Path,
        filename: &str,
        method: &ReportMethod,
    ) -> ScanResult<bool> {
        let ReportMethod::Export {
            formats,
            title,
            by,
            for_,
            scan_date,
            report_date,
            scan_version,
            report_version,
            description,
            severity,
            details,
            settle_secs,
        } = method
        else {
            return Ok(true);
        };

        let advertised = match self
            .api
            .call("exportreport", ApiCategory::View, "formats", &[])
            .await
        {
            Ok(response) => {
                let mut names = Vec::new();
                for item in response.list_items()? {
                    names.push(item.element_value()?.to_string());
                }
                names
            }
            Err(e) => {
                warn!(error = %e, "export add-on format probe failed, skipping export");
                return Ok(false);
            }
        };

        let source_details = format!(
            "{title};{by};{for_};{scan_date};{report_date};{scan_version};{report_version};{description}"
        );
        let alert_severity = [
            severity.high,
            severity.medium,
            severity.low,
            severity.informational,
        ]
        .map(|b| b.to_string())
        .join(";");
        let alert_details = [
            details.cwe_id,
            details.wasc_id,
            details.description,
            details.other_info,
            details.solution,
            details.reference,
            details.request_header,
            details.response_header,
            details.request_body,
            details.response_body,
        ]
        .map(|b| b.to_string())
        .join(";");

        let report_dir = workspace.join(REPORT_DIR);
        self.host
            .create_dir_all(&report_dir)
            .await
            .map_err(|e| ScanError::io(report_dir.clone(), e))?;

        let mut clean = true;
        for format in formats {
            if !advertised.iter().any(|f| f == format) {
                warn!(format, "format not advertised by the export add-on, skipping");
                continue;
            }
            let dest = report_path(workspace, filename, format);
            info!(path = %dest.display(), "generating export report");
            let result = self
                .api
                .call(
                    "exportreport",
                    ApiCategory::Action,
                    "generate",
                    &[
                        ("absolutePath", dest.to_string_lossy().into_owned()),
                        ("fileExtension", format.clone()),
                        ("sourceDetails", source_details.clone()),
                        ("alertSeverity", alert_severity.clone()),
                        ("alertDetails", alert_details.clone()),
                    ],
                )
                .await;
            match result {
                Ok(response) if response.element_value().unwrap_or_default() == "FAIL" => {
                    warn!(format, "export add-on returned FAIL");
                    clean = false;
                }
                Ok(_) => info!(format, "export report generated"),
                Err(e) => {
                    warn!(format, error = %e, "export generate call failed, continuing");
                    clean = false;
                }
            }
            // The add-on writes asynchronously; give it time to settle
            // before the next format reuses its renderer.
            tokio::time::sleep(Duration::from_secs(*settle_secs)).await;
        }
        Ok(clean)
    }

    /// Push deduplicated findings to the defect tracker. Failure is logged
    /// and never affects the build outcome.
    pub async fn create_tracker_issues(&self, tracker: &TrackerConfig) {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        let result = self
            .api
            .call(
                "jiraIssueCreater",
                ApiCategory::Action,
                "createJiraIssues",
                &[
                    ("jiraBaseURL", tracker.base_url.clone()),
                    ("jiraUserName", tracker.username.clone()),
                    ("jiraPassword", tracker.password.clone()),
                    ("projectKey", tracker.project_key.clone()),
                    ("assignee", tracker.assignee.clone()),
                    ("high", flag(tracker.severity.high)),
                    ("medium", flag(tracker.severity.medium)),
                    ("low", flag(tracker.severity.low)),
                    (
                        "filterIssuesByResourceType",
                        flag(tracker.filter_by_resource_type),
                    ),
                ],
            )
            .await;
        match result {
            Ok(_) => info!(project = %tracker.project_key, "tracker issues created"),
            Err(e) => warn!(error = %e, "tracker issue creation failed"),
        }
    }
}
