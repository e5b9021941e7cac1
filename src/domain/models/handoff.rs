//! Cross-step handoff record.
//!
//! The scan step and the verdict step run as separate processes. The scan
//! step writes this record exactly once when it finishes; the verdict step
//! reads it to relaunch the scanner against the persisted session. A
//! missing record means no scan step ran in this workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::config::CmdArg;

/// Directory under the workspace holding run artifacts.
pub const HANDOFF_DIR: &str = ".zapdriver";

/// Filename of the handoff record inside [`HANDOFF_DIR`].
pub const HANDOFF_FILE: &str = "handoff.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffRecord {
    /// Whether the scan step finished with all soft failures clear.
    pub build_success: bool,
    /// Resolved scanner install directory, ready to relaunch from.
    pub install_dir: String,
    pub host: String,
    pub port: u16,
    pub auto_install: bool,
    pub tool_name: Option<String>,
    pub extra_args: Vec<CmdArg>,
    /// Build variables the scan step launched the scanner with; the
    /// verdict relaunch repeats them.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Absolute path of the persisted session, if the run persisted one.
    pub session_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HandoffRecord {
    /// Location of the record under the given workspace.
    pub fn path_in(workspace: &Path) -> PathBuf {
        workspace.join(HANDOFF_DIR).join(HANDOFF_FILE)
    }

    pub fn to_json(&self) -> ScanResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| ScanError::HandoffCorrupt {
            path: PathBuf::from(HANDOFF_FILE),
            reason: e.to_string(),
        })
    }

    pub fn from_json(path: &Path, bytes: &[u8]) -> ScanResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ScanError::HandoffCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
