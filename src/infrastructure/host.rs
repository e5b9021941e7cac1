//! Local adapter for the host-execution port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::domain::ports::host::{HostExecutor, HostOs};

/// Runs everything on the machine the driver itself runs on.
#[derive(Debug, Clone, Default)]
pub struct LocalHost;

#[async_trait]
impl HostExecutor for LocalHost {
    fn os(&self) -> HostOs {
        if cfg!(windows) {
            HostOs::Windows
        } else {
            HostOs::Unix
        }
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }

    async fn probe_tcp(&self, host: &str, port: u16, timeout: Duration) -> std::io::Result<()> {
        let connect = TcpStream::connect((host, port));
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {host}:{port} timed out"),
            )),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn list_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_an_absent_dir_is_empty() {
        let host = LocalHost;
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(host.list_dir(&missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let host = LocalHost;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        host.create_dir_all(path.parent().unwrap()).await.unwrap();
        host.write_file(&path, b"payload").await.unwrap();
        assert_eq!(host.read_file(&path).await.unwrap(), b"payload");
        let listed = host.list_dir(path.parent().unwrap()).await.unwrap();
        assert_eq!(listed, vec![path.clone()]);
        host.remove_file(&path).await.unwrap();
        assert!(host.list_dir(path.parent().unwrap()).await.unwrap().is_empty());
    }

    #[test]
    fn env_vars_reflect_the_process_environment() {
        std::env::set_var("ZAPDRIVER_ENV_MARKER", "1");
        let host = LocalHost;
        assert!(host
            .env_vars()
            .iter()
            .any(|(k, v)| k == "ZAPDRIVER_ENV_MARKER" && v == "1"));
        assert_eq!(host.env_var("ZAPDRIVER_ENV_MARKER").as_deref(), Some("1"));
        std::env::remove_var("ZAPDRIVER_ENV_MARKER");
    }

    #[tokio::test]
    async fn probe_succeeds_against_a_listener() {
        let host = LocalHost;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        host.probe_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .expect("listener should accept");
    }

    #[tokio::test]
    async fn probe_refused_port_is_an_error() {
        let host = LocalHost;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = host
            .probe_tcp("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_ne!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
