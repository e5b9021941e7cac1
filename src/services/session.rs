//! Session load and persist.
//!
//! A run either loads a previously persisted session or persists a new one,
//! never both. Persisting can first prune sites outside the internal-sites
//! list so the saved session only carries first-party traffic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::ScanResult;
use crate::domain::models::config::{pattern_lines, SessionMode, SESSION_EXTENSION};
use crate::domain::ports::control_api::{ApiCategory, ControlApi};

pub struct SessionService {
    api: Arc<dyn ControlApi>,
}

impl SessionService {
    pub fn new(api: Arc<dyn ControlApi>) -> Self {
        Self { api }
    }

    /// Run-start step: load the named session in load mode, no-op otherwise.
    pub async fn start(&self, mode: &SessionMode) -> ScanResult<()> {
        match mode {
            SessionMode::Load { path } => {
                info!(path, "loading session");
                self.api
                    .call(
                        "core",
                        ApiCategory::Action,
                        "loadSession",
                        &[("name", path.clone())],
                    )
                    .await?;
                Ok(())
            }
            SessionMode::Persist { .. } => Ok(()),
        }
    }

    /// Run-end step: prune and save in persist mode.
    ///
    /// Returns the absolute session path (persist mode only) and whether
    /// every step succeeded.
    pub async fn finish(
        &self,
        mode: &SessionMode,
        workspace: &Path,
    ) -> ScanResult<(Option<PathBuf>, bool)> {
        let SessionMode::Persist {
            filename,
            prune_external_sites,
            internal_sites,
        } = mode
        else {
            return Ok((None, true));
        };

        let mut clean = true;
        if *prune_external_sites {
            clean = self.prune_external_sites(internal_sites).await?;
        }

        let session_path = workspace.join(format!("{filename}{SESSION_EXTENSION}"));
        info!(path = %session_path.display(), "persisting session");
        self.api
            .call(
                "core",
                ApiCategory::Action,
                "saveSession",
                &[
                    ("name", session_path.to_string_lossy().into_owned()),
                    ("overwrite", "true".to_string()),
                ],
            )
            .await?;
        Ok((Some(session_path), clean))
    }

    /// Delete every site the scanner knows that is not in the internal
    /// list. The first failed deletion stops the loop.
    async fn prune_external_sites(&self, internal_sites: &str) -> ScanResult<bool> {
        let internal = pattern_lines(internal_sites);
        let sites = self
            .api
            .call("core", ApiCategory::View, "sites", &[])
            .await?;
        for item in sites.list_items()? {
            let site = item.element_value()?;
            if internal.iter().any(|keep| site.contains(keep)) {
                info!(site, "keeping internal site");
                continue;
            }
            info!(site, "deleting external site");
            let result = self
                .api
                .call(
                    "core",
                    ApiCategory::Action,
                    "deleteSiteNode",
                    &[("url", site.to_string())],
                )
                .await;
            if let Err(e) = result {
                warn!(site, error = %e, "failed to delete external site, stopping prune");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
