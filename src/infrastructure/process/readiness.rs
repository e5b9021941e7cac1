//! TCP readiness gate for the scanner daemon.
//!
//! The daemon takes a while to open its API port after launch. The gate
//! retries a plain TCP connect until the port accepts, a per-attempt
//! timeout fires, or the overall budget runs out.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::domain::cancel::CancelToken;
use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::ports::host::HostExecutor;

/// Pause between failed connect attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Block until `host:port` accepts a TCP connection.
///
/// Each attempt's connect timeout is the remaining budget, so a silently
/// dropping endpoint cannot stretch the wait past `timeout_secs`. A connect
/// timeout is terminal; a refused connect retries after a short delay.
pub async fn wait_until_ready(
    executor: &dyn HostExecutor,
    host: &str,
    port: u16,
    timeout_secs: u64,
    cancel: &mut CancelToken,
) -> ScanResult<()> {
    let budget = Duration::from_secs(timeout_secs);
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let elapsed = start.elapsed();
        let Some(remaining) = budget.checked_sub(elapsed) else {
            return Err(ScanError::ReadinessTimeout {
                host: host.to_string(),
                port,
                timeout_secs,
            });
        };
        match executor.probe_tcp(host, port, remaining).await {
            Ok(()) => {
                info!(host, port, elapsed_ms = elapsed.as_millis() as u64, "scanner is ready");
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(ScanError::ReadinessTimeout {
                    host: host.to_string(),
                    port,
                    timeout_secs,
                });
            }
            Err(e) => {
                debug!(host, port, error = %e, "scanner not accepting yet");
                tokio::select! {
                    () = tokio::time::sleep(RETRY_DELAY) => {}
                    () = cancel.cancelled() => return Err(ScanError::Cancelled),
                }
            }
        }
    }
}
