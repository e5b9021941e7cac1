//! Domain errors for the zapdriver scan pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ports::control_api::ApiError;

/// Errors raised while configuring, launching, or driving a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0} is missing, provided value was empty")]
    MissingField(&'static str),

    #[error("scanner installation directory is missing")]
    MissingInstallDir,

    #[error("unable to connect to the scanner on {host}:{port} after {timeout_secs} seconds")]
    ReadinessTimeout {
        host: String,
        port: u16,
        timeout_secs: u64,
    },

    #[error("{phase} did not finish within {timeout_secs} seconds")]
    PhaseTimeout {
        phase: &'static str,
        timeout_secs: u64,
    },

    #[error("control API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("failed to launch scanner process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("alert filter file {path} is malformed: {reason}")]
    AlertFilterParse { path: PathBuf, reason: String },

    #[error("no handoff record at {0}: the scan step did not run")]
    HandoffMissing(PathBuf),

    #[error("handoff record at {path} could not be decoded: {reason}")]
    HandoffCorrupt { path: PathBuf, reason: String },

    #[error("scan cancelled")]
    Cancelled,
}

pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Convenience constructor for filesystem failures that carry a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
