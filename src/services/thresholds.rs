//! Threshold evaluation: scaled alert counts against soft limits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::models::alert::{AlertCounts, Severity};
use crate::domain::models::config::ThresholdConfig;

/// Tri-state build outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Unstable,
    Fail,
}

impl Verdict {
    /// Process exit code for CI: pass 0, unstable 2, fail 1.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Unstable => 2,
            Self::Fail => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Unstable => "UNSTABLE",
            Self::Fail => "FAIL",
        })
    }
}

/// Per-severity scaled values, kept for the summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub scaled_high: i64,
    pub scaled_medium: i64,
    pub scaled_low: i64,
    pub scaled_informational: i64,
    pub scaled_total: i64,
}

impl Evaluation {
    pub fn scaled(&self, severity: Severity) -> i64 {
        match severity {
            Severity::High => self.scaled_high,
            Severity::Medium => self.scaled_medium,
            Severity::Low => self.scaled_low,
            Severity::Informational => self.scaled_informational,
        }
    }
}

/// Evaluate deduplicated counts against the configured limits.
///
/// Fail conditions are checked first and short-circuit: a scaled High
/// total over its soft limit, or a scaled grand total over the cumulative
/// limit, fails the build outright. Otherwise any Medium, Low, or
/// Informational scaled total over its own soft limit marks the build
/// unstable.
pub fn evaluate(config: &ThresholdConfig, counts: &AlertCounts) -> Evaluation {
    let scaled_high = config.high.weight * i64::from(counts.high);
    let scaled_medium = config.medium.weight * i64::from(counts.medium);
    let scaled_low = config.low.weight * i64::from(counts.low);
    let scaled_informational = config.informational.weight * i64::from(counts.informational);
    let scaled_total = scaled_high + scaled_medium + scaled_low + scaled_informational;

    let verdict = if scaled_high > config.high.soft_limit || scaled_total > config.cumulative_limit
    {
        Verdict::Fail
    } else if scaled_medium > config.medium.soft_limit
        || scaled_low > config.low.soft_limit
        || scaled_informational > config.informational.soft_limit
    {
        Verdict::Unstable
    } else {
        Verdict::Pass
    };

    Evaluation {
        verdict,
        scaled_high,
        scaled_medium,
        scaled_low,
        scaled_informational,
        scaled_total,
    }
}
