//! Scanner daemon launcher.
//!
//! Resolves the install directory, assembles the daemon command line, and
//! owns the child process for the lifetime of the run. The scanner is a
//! long-lived daemon: the launch only starts it, the readiness gate decides
//! when it is usable.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::config::{ScanConfig, ScannerConfig, API_KEY};
use crate::domain::ports::host::{HostExecutor, HostOs};

/// Launch script per host OS family.
pub fn executable_name(os: HostOs) -> &'static str {
    match os {
        HostOs::Unix => "zap.sh",
        HostOs::Windows => "zap.bat",
    }
}

/// Resolve the scanner install directory.
///
/// Precedence: explicit `install_dir`, then the environment variable named
/// by `install_env_var` (looked up on the execution host), then the
/// auto-install registry. Empty results count as missing.
pub fn resolve_install_dir(config: &ScanConfig, host: &dyn HostExecutor) -> ScanResult<String> {
    let scanner = &config.scanner;
    if let Some(dir) = scanner.install_dir.as_deref() {
        if !dir.trim().is_empty() {
            return Ok(dir.to_string());
        }
    }
    if let Some(var) = scanner.install_env_var.as_deref() {
        if let Some(dir) = host.env_var(var) {
            if !dir.trim().is_empty() {
                return Ok(dir);
            }
        }
    }
    if scanner.auto_install {
        if let Some(tool) = scanner.tool_name.as_deref() {
            if let Some(dir) = config.tools.get(tool) {
                if !dir.trim().is_empty() {
                    return Ok(dir.clone());
                }
            }
        }
    }
    Err(ScanError::MissingInstallDir)
}

/// Assemble the daemon's argument vector (everything after the executable).
///
/// Extra pairs with an empty option or value are skipped.
pub fn command_args(scanner: &ScannerConfig) -> Vec<String> {
    let mut args = vec![
        "-daemon".to_string(),
        "-host".to_string(),
        scanner.host.clone(),
        "-port".to_string(),
        scanner.port.to_string(),
        "-config".to_string(),
        format!("api.key={API_KEY}"),
    ];
    if let Some(dir) = scanner.settings_dir.as_deref() {
        if !dir.trim().is_empty() {
            args.push("-dir".to_string());
            args.push(dir.to_string());
        }
    }
    for pair in &scanner.extra_args {
        if pair.option.trim().is_empty() || pair.value.trim().is_empty() {
            warn!(option = %pair.option, value = %pair.value, "skipping incomplete extra argument pair");
            continue;
        }
        args.push(pair.option.clone());
        args.push(pair.value.clone());
    }
    args
}

/// Fold build-supplied variables over the process environment.
///
/// Windows treats environment keys case-insensitively, so an override there
/// replaces any existing key that matches ignoring case.
pub fn merge_env(
    base: impl IntoIterator<Item = (String, String)>,
    overrides: &BTreeMap<String, String>,
    os: HostOs,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = base.into_iter().collect();
    for (key, value) in overrides {
        if os == HostOs::Windows {
            let existing: Vec<String> = merged
                .keys()
                .filter(|k| k.eq_ignore_ascii_case(key))
                .cloned()
                .collect();
            for k in existing {
                merged.remove(&k);
            }
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Running scanner daemon. Dropping the handle kills the child.
pub struct ScannerProcess {
    child: Child,
}

impl ScannerProcess {
    /// Wait up to `deadline` for the daemon to exit on its own, then kill.
    pub async fn shutdown_join(&mut self, deadline: Duration) -> ScanResult<()> {
        match tokio::time::timeout(deadline, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "scanner process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(ScanError::Spawn(e)),
            Err(_elapsed) => {
                warn!(deadline_secs = deadline.as_secs(), "scanner did not exit in time, killing");
                self.child.start_kill().map_err(ScanError::Spawn)?;
                let _ = self.child.wait().await;
                Ok(())
            }
        }
    }
}

impl Drop for ScannerProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Spawn the scanner daemon from `install_dir` with the assembled command
/// line, folding the configured build variables over the host environment
/// and streaming its output into the build log.
pub fn launch(
    install_dir: &str,
    scanner: &ScannerConfig,
    host: &dyn HostExecutor,
) -> ScanResult<ScannerProcess> {
    let os = host.os();
    let exe = Path::new(install_dir).join(executable_name(os));
    let args = command_args(scanner);
    info!(exe = %exe.display(), ?args, "launching scanner daemon");

    let env = merge_env(host.env_vars(), &scanner.env, os);
    let mut command = Command::new(&exe);
    command
        .args(&args)
        .current_dir(install_dir)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ScanError::Spawn)?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(stream_output(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(stream_output(stderr, "stderr"));
    }

    Ok(ScannerProcess { child })
}

async fn stream_output<R>(reader: R, stream: &'static str)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "zapdriver::scanner", stream, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CmdArg;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FakeHost {
        os: HostOs,
        env: BTreeMap<String, String>,
    }

    #[async_trait]
    impl HostExecutor for FakeHost {
        fn os(&self) -> HostOs {
            self.os
        }
        fn env_var(&self, name: &str) -> Option<String> {
            self.env.get(name).cloned()
        }
        fn env_vars(&self) -> Vec<(String, String)> {
            self.env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
        async fn probe_tcp(
            &self,
            _host: &str,
            _port: u16,
            _timeout: Duration,
        ) -> std::io::Result<()> {
            Ok(())
        }
        async fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }
        async fn write_file(&self, _path: &Path, _bytes: &[u8]) -> std::io::Result<()> {
            Ok(())
        }
        async fn read_file(&self, _path: &Path) -> std::io::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn list_dir(&self, _path: &Path) -> std::io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        async fn remove_file(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn host_with(env: &[(&str, &str)]) -> FakeHost {
        FakeHost {
            os: HostOs::Unix,
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn explicit_install_dir_wins() {
        let mut config = ScanConfig::default();
        config.scanner.install_dir = Some("/opt/zaproxy".into());
        config.scanner.install_env_var = Some("ZAP_HOME".into());
        let host = host_with(&[("ZAP_HOME", "/elsewhere")]);
        assert_eq!(resolve_install_dir(&config, &host).unwrap(), "/opt/zaproxy");
    }

    #[test]
    fn env_var_resolution_falls_back_to_registry() {
        let mut config = ScanConfig::default();
        config.scanner.install_env_var = Some("ZAP_HOME".into());
        config.scanner.auto_install = true;
        config.scanner.tool_name = Some("zap".into());
        config.tools.insert("zap".into(), "/opt/tools/zap".into());
        let host = host_with(&[]);
        assert_eq!(
            resolve_install_dir(&config, &host).unwrap(),
            "/opt/tools/zap"
        );
    }

    #[test]
    fn missing_everything_is_an_error() {
        let config = ScanConfig::default();
        let host = host_with(&[]);
        assert!(matches!(
            resolve_install_dir(&config, &host),
            Err(ScanError::MissingInstallDir)
        ));
    }

    #[test]
    fn empty_env_value_counts_as_missing() {
        let mut config = ScanConfig::default();
        config.scanner.install_env_var = Some("ZAP_HOME".into());
        let host = host_with(&[("ZAP_HOME", "  ")]);
        assert!(resolve_install_dir(&config, &host).is_err());
    }

    #[test]
    fn command_args_carry_daemon_host_port_and_key() {
        let scanner = ScannerConfig {
            host: "127.0.0.1".into(),
            port: 8090,
            ..Default::default()
        };
        let args = command_args(&scanner);
        assert_eq!(
            args,
            vec![
                "-daemon",
                "-host",
                "127.0.0.1",
                "-port",
                "8090",
                "-config",
                "api.key=ZAPROXY-PLUGIN",
            ]
        );
    }

    #[test]
    fn settings_dir_and_extra_pairs_are_appended() {
        let scanner = ScannerConfig {
            settings_dir: Some("/home/ci/.zap".into()),
            extra_args: vec![
                CmdArg {
                    option: "-config".into(),
                    value: "spider.maxDuration=5".into(),
                },
                CmdArg {
                    option: "".into(),
                    value: "orphan".into(),
                },
            ],
            ..Default::default()
        };
        let args = command_args(&scanner);
        let tail: Vec<&str> = args.iter().map(String::as_str).collect();
        assert!(tail.ends_with(&["-dir", "/home/ci/.zap", "-config", "spider.maxDuration=5"]));
        assert!(!args.contains(&"orphan".to_string()));
    }

    #[test]
    fn windows_env_merge_is_case_insensitive() {
        let base = vec![("Path".to_string(), "C:\\old".to_string())];
        let mut overrides = BTreeMap::new();
        overrides.insert("PATH".to_string(), "C:\\new".to_string());
        let merged = merge_env(base, &overrides, HostOs::Windows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("PATH"), Some(&"C:\\new".to_string()));
    }

    #[test]
    fn unix_env_merge_keeps_distinct_cases() {
        let base = vec![("Path".to_string(), "/old".to_string())];
        let mut overrides = BTreeMap::new();
        overrides.insert("PATH".to_string(), "/new".to_string());
        let merged = merge_env(base, &overrides, HostOs::Unix);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_join_kills_a_lingering_child() {
        let child = Command::new("sh")
            .args(["-c", "sleep 30"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("sh should spawn");
        let mut process = ScannerProcess { child };
        let start = std::time::Instant::now();
        process
            .shutdown_join(Duration::from_millis(200))
            .await
            .expect("join should kill and return");
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
