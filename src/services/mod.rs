//! Scan pipeline services built on the domain ports.

pub mod alert_filters;
pub mod alerts;
pub mod context;
pub mod orchestrator;
pub mod phases;
pub mod reports;
pub mod session;
pub mod thresholds;
pub mod verdict;

pub use orchestrator::{Orchestrator, ScanOutcome};
pub use phases::{Phase, ScanEvent};
pub use thresholds::{evaluate, Verdict};
