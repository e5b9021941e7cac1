//! Pure configuration and result models for the scan pipeline.

pub mod alert;
pub mod config;
pub mod handoff;

pub use alert::{Alert, AlertCounts, Severity};
pub use config::{
    ActiveScanConfig, AjaxSpiderConfig, AuthConfig, AuthMethod, CmdArg, ContextConfig,
    DetailMask, PhasesConfig, ReportConfig, ReportMethod, ScanConfig, ScannerConfig,
    ScriptParam, SessionMode, SeverityMask, SeverityThreshold, SpiderConfig, ThresholdConfig,
    TrackerConfig, TrackerSeverityMask, API_KEY,
};
pub use handoff::HandoffRecord;
