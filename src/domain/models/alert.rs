//! Alert severities and the deduplicated per-severity tally.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scanner risk buckets, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
    Informational,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Informational,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Informational => "Informational",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            "Informational" => Ok(Self::Informational),
            other => Err(format!("unknown severity [ {other} ]")),
        }
    }
}

/// One alert as reported by the scanner's alert listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Stable identity of the finding kind, independent of how many
    /// URLs it fired on.
    pub fingerprint: String,
    pub severity: Severity,
}

/// Deduplicated alert counts per severity.
///
/// Each distinct fingerprint counts at most once inside its bucket; the
/// same fingerprint at two severities counts once in each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub informational: u32,
}

impl AlertCounts {
    pub fn from_alerts<'a, I>(alerts: I) -> Self
    where
        I: IntoIterator<Item = &'a Alert>,
    {
        let mut seen: HashSet<(Severity, &str)> = HashSet::new();
        let mut counts = Self::default();
        for alert in alerts {
            if seen.insert((alert.severity, alert.fingerprint.as_str())) {
                *counts.bucket_mut(alert.severity) += 1;
            }
        }
        counts
    }

    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Informational => self.informational,
        }
    }

    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low + self.informational
    }

    fn bucket_mut(&mut self, severity: Severity) -> &mut u32 {
        match severity {
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Informational => &mut self.informational,
        }
    }
}
