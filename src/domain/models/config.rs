//! Scan run configuration.
//!
//! A [`ScanConfig`] is built once per build from the job's configuration
//! file (plus environment overrides), passed through a placeholder-expansion
//! and validation pass, and never mutated afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// API key baked into every control call and into the scanner's launch
/// arguments.
pub const API_KEY: &str = "ZAPROXY-PLUGIN";

/// Subdirectory of the workspace where generated reports land.
pub const REPORT_DIR: &str = "reports";

/// Extension appended to persisted session files.
pub const SESSION_EXTENSION: &str = ".session";

/// Top-level descriptor of one scan run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Build workspace on the execution host.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    pub scanner: ScannerConfig,

    #[serde(default)]
    pub session: SessionMode,

    pub context: ContextConfig,

    /// Crawl/attack starting point.
    #[serde(default)]
    pub target_url: String,

    /// Authentication block; absent means every phase runs unauthenticated.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    #[serde(default)]
    pub phases: PhasesConfig,

    #[serde(default)]
    pub reports: Option<ReportConfig>,

    #[serde(default)]
    pub tracker: Option<TrackerConfig>,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Auto-install registry: tool name to install directory, used when
    /// `scanner.auto_install` is set.
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

/// Where the scanner lives and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScannerConfig {
    /// Explicit install directory; takes precedence over the other two
    /// resolution paths.
    #[serde(default)]
    pub install_dir: Option<String>,

    /// Environment variable (on the execution host) naming the install
    /// directory.
    #[serde(default)]
    pub install_env_var: Option<String>,

    /// Resolve the install directory from the `tools` registry instead.
    #[serde(default)]
    pub auto_install: bool,

    /// Registry key used when `auto_install` is set.
    #[serde(default)]
    pub tool_name: Option<String>,

    pub host: String,

    pub port: u16,

    /// Seconds the readiness gate waits for the control API.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Optional `-dir` settings directory passed to the scanner.
    #[serde(default)]
    pub settings_dir: Option<String>,

    /// Extra command-line option/value pairs appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<CmdArg>,

    /// Build variables folded over the daemon's process environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Upper bound on the post-shutdown process join.
    #[serde(default = "default_shutdown_join")]
    pub shutdown_join_secs: u64,
}

fn default_startup_timeout() -> u64 {
    60
}

fn default_shutdown_join() -> u64 {
    60 * 60
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            install_env_var: None,
            auto_install: false,
            tool_name: None,
            host: "127.0.0.1".into(),
            port: 8090,
            startup_timeout_secs: default_startup_timeout(),
            settings_dir: None,
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            shutdown_join_secs: default_shutdown_join(),
        }
    }
}

/// One extra command-line pair; empty halves are skipped at assembly time.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CmdArg {
    #[serde(default)]
    pub option: String,
    #[serde(default)]
    pub value: String,
}

/// Session handling: exactly one of load-existing or persist-new per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum SessionMode {
    /// Load a previously persisted session from an absolute path.
    Load { path: String },
    /// Persist the session under the workspace when the run ends.
    Persist {
        filename: String,
        /// Prune sites outside `internal_sites` from the sites tree before
        /// persisting.
        #[serde(default)]
        prune_external_sites: bool,
        /// Newline-delimited site list kept when pruning.
        #[serde(default)]
        internal_sites: String,
    },
}

impl Default for SessionMode {
    fn default() -> Self {
        Self::Persist {
            filename: "zapdriver".into(),
            prune_external_sites: false,
            internal_sites: String::new(),
        }
    }
}

/// Scope context: name, URL patterns, optional alert-severity overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    #[serde(default)]
    pub name: String,

    /// Newline-delimited include patterns; one include call per non-blank
    /// trimmed line.
    #[serde(default)]
    pub include_urls: String,

    /// Newline-delimited exclude patterns.
    #[serde(default)]
    pub exclude_urls: String,

    /// Name of an alert-filter rule file under
    /// `<settings_dir>/alertfilters/<name>.alertfilter`.
    #[serde(default)]
    pub alert_filters: Option<String>,
}

/// Authentication block shared by both strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub logged_in_indicator: String,
    #[serde(default)]
    pub logged_out_indicator: String,
    pub method: AuthMethod,
}

/// The two authentication strategies the scanner supports here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum AuthMethod {
    FormBased {
        login_url: String,
        username_param: String,
        password_param: String,
        #[serde(default)]
        extra_post_data: String,
    },
    ScriptBased {
        script_name: String,
        #[serde(default)]
        params: Vec<ScriptParam>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptParam {
    pub name: String,
    pub value: String,
}

/// Phase toggles and loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhasesConfig {
    #[serde(default)]
    pub spider: Option<SpiderConfig>,

    #[serde(default)]
    pub ajax_spider: Option<AjaxSpiderConfig>,

    #[serde(default)]
    pub active_scan: Option<ActiveScanConfig>,

    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Optional per-phase wall-clock bound; `None` leaves the process join
    /// deadline as the only circuit breaker.
    #[serde(default)]
    pub phase_timeout_secs: Option<u64>,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            spider: None,
            ajax_spider: None,
            active_scan: None,
            poll_interval_secs: default_poll_interval(),
            phase_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpiderConfig {
    #[serde(default = "default_true")]
    pub recurse: bool,
    #[serde(default)]
    pub subtree_only: bool,
    /// 0 means no limit.
    #[serde(default)]
    pub max_children: u32,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            recurse: true,
            subtree_only: false,
            max_children: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AjaxSpiderConfig {
    #[serde(default)]
    pub in_scope_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActiveScanConfig {
    #[serde(default = "default_true")]
    pub recurse: bool,
    /// Scan policy name; empty means the scanner's default policy.
    #[serde(default)]
    pub policy: Option<String>,
}

impl Default for ActiveScanConfig {
    fn default() -> Self {
        Self {
            recurse: true,
            policy: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Report generation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Base filename; the format extension is appended per report.
    pub filename: String,

    /// Clear previously generated reports of the selected formats first.
    #[serde(default)]
    pub delete_stale: bool,

    pub method: ReportMethod,
}

/// Built-in renderers vs the export add-on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ReportMethod {
    Builtin {
        formats: Vec<String>,
    },
    Export {
        formats: Vec<String>,
        title: String,
        #[serde(default)]
        by: String,
        #[serde(default, rename = "for")]
        for_: String,
        #[serde(default)]
        scan_date: String,
        #[serde(default)]
        report_date: String,
        #[serde(default)]
        scan_version: String,
        #[serde(default)]
        report_version: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        severity: SeverityMask,
        #[serde(default)]
        details: DetailMask,
        /// Seconds to wait after each generate call before the next format.
        #[serde(default = "default_settle")]
        settle_secs: u64,
    },
}

fn default_settle() -> u64 {
    10
}

/// Which severities a report or tracker push includes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SeverityMask {
    #[serde(default = "default_true")]
    pub high: bool,
    #[serde(default = "default_true")]
    pub medium: bool,
    #[serde(default = "default_true")]
    pub low: bool,
    #[serde(default)]
    pub informational: bool,
}

impl Default for SeverityMask {
    fn default() -> Self {
        Self {
            high: true,
            medium: true,
            low: true,
            informational: false,
        }
    }
}

/// Which per-alert detail columns the export add-on renders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DetailMask {
    pub cwe_id: bool,
    pub wasc_id: bool,
    pub description: bool,
    pub other_info: bool,
    pub solution: bool,
    pub reference: bool,
    pub request_header: bool,
    pub response_header: bool,
    pub request_body: bool,
    pub response_body: bool,
}

impl Default for DetailMask {
    fn default() -> Self {
        Self {
            cwe_id: true,
            wasc_id: true,
            description: true,
            other_info: false,
            solution: true,
            reference: true,
            request_header: false,
            response_header: false,
            request_body: false,
            response_body: false,
        }
    }
}

/// Defect-tracker issue creation block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub project_key: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub severity: TrackerSeverityMask,
    /// Group issues by resource type instead of one per alert.
    #[serde(default)]
    pub filter_by_resource_type: bool,
}

/// Tracker pushes have no informational toggle upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TrackerSeverityMask {
    #[serde(default = "default_true")]
    pub high: bool,
    #[serde(default = "default_true")]
    pub medium: bool,
    #[serde(default)]
    pub low: bool,
}

impl Default for TrackerSeverityMask {
    fn default() -> Self {
        Self {
            high: true,
            medium: true,
            low: false,
        }
    }
}

/// Per-severity weight and soft limit, plus the cumulative soft limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub high: SeverityThreshold,
    pub medium: SeverityThreshold,
    pub low: SeverityThreshold,
    pub informational: SeverityThreshold,
    /// Soft limit on the sum of all four scaled values.
    pub cumulative_limit: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SeverityThreshold {
    pub weight: i64,
    pub soft_limit: i64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            high: SeverityThreshold {
                weight: 10,
                soft_limit: 0,
            },
            medium: SeverityThreshold {
                weight: 5,
                soft_limit: 50,
            },
            low: SeverityThreshold {
                weight: 1,
                soft_limit: 100,
            },
            informational: SeverityThreshold {
                weight: 0,
                soft_limit: 1000,
            },
            cumulative_limit: 100,
        }
    }
}

/// Split a newline-delimited pattern block into its non-blank trimmed lines.
pub fn pattern_lines(block: &str) -> Vec<&str> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
