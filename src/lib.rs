//! zapdriver - CI-oriented DAST scan orchestrator.
//!
//! Drives a ZAP-style scanner daemon through a full CI scan: launch and
//! readiness, session and context setup, authentication, the spider / AJAX
//! spider / active scan phases, report and tracker output, and a
//! threshold-based tri-state verdict evaluated in a separate post-build
//! step.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): pure models, ports, errors, cancellation
//! - **Service Layer** (`services`): the scan pipeline and verdict logic
//! - **Infrastructure Layer** (`infrastructure`): config, HTTP client,
//!   process management
//! - **CLI Layer** (`cli`): the `scan` and `verdict` commands

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{AlertCounts, HandoffRecord, ScanConfig, Severity};
pub use domain::{CancelHandle, CancelToken, ScanError, ScanResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{evaluate, Orchestrator, ScanOutcome, Verdict};
