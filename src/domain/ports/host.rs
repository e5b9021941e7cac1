//! Host-relative execution capability.
//!
//! The orchestrator may run on a different machine than the scanner (the CI
//! system's distributed-agent model). Anything host-relative — install-path
//! lookup, the readiness socket probe, report file writes — goes through
//! this capability instead of assuming the local filesystem.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// Operating-system family of the execution host, used to pick the
/// scanner's launch script and the environment-merge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Unix,
    Windows,
}

/// Capability interface for filesystem, socket, and environment operations
/// on the host that owns the scanner process and the build workspace.
#[async_trait]
pub trait HostExecutor: Send + Sync {
    fn os(&self) -> HostOs;

    /// Look up an environment variable on the execution host.
    fn env_var(&self, name: &str) -> Option<String>;

    /// Snapshot of the execution host's environment, the base the scanner
    /// daemon inherits.
    fn env_vars(&self) -> Vec<(String, String)>;

    /// Attempt one TCP connect with the given per-attempt timeout.
    ///
    /// A timeout surfaces as `std::io::ErrorKind::TimedOut`.
    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> std::io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;

    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// List regular files directly under `path`; an absent directory is an
    /// empty listing, not an error.
    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>>;

    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}
