//! Scan phases: spider, AJAX spider, active scan.
//!
//! Each phase moves Idle -> Running -> Polling -> Done. The scanner offers
//! no push notifications, so progress is a poll loop: sleep, re-query the
//! status view, snapshot the alert count. Spider and active scan run as the
//! configured user when one exists; the AJAX spider has no as-user variant
//! and always crawls unauthenticated.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::cancel::CancelToken;
use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::config::PhasesConfig;
use crate::domain::ports::control_api::{ApiCategory, ControlApi};
use crate::services::context::ContextIds;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Spider,
    AjaxSpider,
    ActiveScan,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spider => "spider",
            Self::AjaxSpider => "ajax spider",
            Self::ActiveScan => "active scan",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress stream consumed by the CLI renderer.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    PhaseSkipped { phase: Phase },
    PhaseStarted { phase: Phase },
    PhaseProgress {
        phase: Phase,
        /// Percent complete; the AJAX spider reports none.
        percent: Option<u8>,
        alerts: i64,
    },
    PhaseCompleted { phase: Phase },
}

pub struct PhaseRunner {
    api: Arc<dyn ControlApi>,
    config: PhasesConfig,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl PhaseRunner {
    pub fn new(
        api: Arc<dyn ControlApi>,
        config: PhasesConfig,
        events: Option<mpsc::UnboundedSender<ScanEvent>>,
    ) -> Self {
        Self {
            api,
            config,
            events,
        }
    }

    /// Run every enabled phase in order: spider, AJAX spider, active scan.
    pub async fn run_all(
        &self,
        target_url: &str,
        context_name: &str,
        ids: &ContextIds,
        cancel: &mut CancelToken,
    ) -> ScanResult<()> {
        if self.config.spider.is_some() {
            self.run_spider(target_url, context_name, ids, cancel).await?;
        } else {
            self.skip(Phase::Spider);
        }
        if self.config.ajax_spider.is_some() {
            self.run_ajax_spider(target_url, cancel).await?;
        } else {
            self.skip(Phase::AjaxSpider);
        }
        if self.config.active_scan.is_some() {
            self.run_active_scan(target_url, ids, cancel).await?;
        } else {
            self.skip(Phase::ActiveScan);
        }
        Ok(())
    }

    fn skip(&self, phase: Phase) {
        info!(%phase, "phase disabled, skipping");
        self.emit(ScanEvent::PhaseSkipped { phase });
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    async fn run_spider(
        &self,
        target_url: &str,
        context_name: &str,
        ids: &ContextIds,
        cancel: &mut CancelToken,
    ) -> ScanResult<()> {
        let Some(spider) = &self.config.spider else {
            return Ok(());
        };
        let recurse = spider.recurse.to_string();
        let subtree_only = spider.subtree_only.to_string();
        let max_children = spider.max_children.to_string();

        info!(target_url, authenticated = ids.user_id.is_some(), "starting spider");
        let response = match &ids.user_id {
            Some(user_id) => {
                self.api
                    .call(
                        "spider",
                        ApiCategory::Action,
                        "scanAsUser",
                        &[
                            ("contextId", ids.context_id.clone()),
                            ("userId", user_id.clone()),
                            ("url", target_url.to_string()),
                            ("maxChildren", max_children),
                            ("recurse", recurse),
                            ("subtreeOnly", subtree_only),
                        ],
                    )
                    .await?
            }
            None => {
                self.api
                    .call(
                        "spider",
                        ApiCategory::Action,
                        "scan",
                        &[
                            ("url", target_url.to_string()),
                            ("maxChildren", max_children),
                            ("recurse", recurse),
                            ("contextName", context_name.to_string()),
                            ("subtreeOnly", subtree_only),
                        ],
                    )
                    .await?
            }
        };
        let scan_id = response.element_value()?.to_string();
        self.emit(ScanEvent::PhaseStarted { phase: Phase::Spider });

        let clock = self.clock(Phase::Spider);
        loop {
            let status = self
                .api
                .call(
                    "spider",
                    ApiCategory::View,
                    "status",
                    &[("scanId", scan_id.clone())],
                )
                .await?
                .element_as_int()?;
            let alerts = self.alert_count().await;
            info!(percent = status, alerts, "spider progress");
            self.emit(ScanEvent::PhaseProgress {
                phase: Phase::Spider,
                percent: u8::try_from(status.clamp(0, 100)).ok(),
                alerts,
            });
            if status >= 100 {
                break;
            }
            clock.tick(cancel).await?;
        }
        self.emit(ScanEvent::PhaseCompleted { phase: Phase::Spider });
        Ok(())
    }

    async fn run_ajax_spider(&self, target_url: &str, cancel: &mut CancelToken) -> ScanResult<()> {
        let Some(ajax) = &self.config.ajax_spider else {
            return Ok(());
        };
        info!(target_url, in_scope_only = ajax.in_scope_only, "starting AJAX spider");
        self.api
            .call(
                "ajaxSpider",
                ApiCategory::Action,
                "scan",
                &[
                    ("url", target_url.to_string()),
                    ("inScope", ajax.in_scope_only.to_string()),
                ],
            )
            .await?;
        self.emit(ScanEvent::PhaseStarted { phase: Phase::AjaxSpider });

        let clock = self.clock(Phase::AjaxSpider);
        loop {
            let status = self
                .api
                .call("ajaxSpider", ApiCategory::View, "status", &[])
                .await?
                .element_value()?
                .to_string();
            let alerts = self.alert_count().await;
            info!(status = %status, alerts, "AJAX spider progress");
            self.emit(ScanEvent::PhaseProgress {
                phase: Phase::AjaxSpider,
                percent: None,
                alerts,
            });
            if status != "running" {
                break;
            }
            clock.tick(cancel).await?;
        }
        self.emit(ScanEvent::PhaseCompleted { phase: Phase::AjaxSpider });
        Ok(())
    }

    async fn run_active_scan(
        &self,
        target_url: &str,
        ids: &ContextIds,
        cancel: &mut CancelToken,
    ) -> ScanResult<()> {
        let Some(active) = &self.config.active_scan else {
            return Ok(());
        };
        let recurse = active.recurse.to_string();
        let policy = active.policy.clone().unwrap_or_default();

        info!(target_url, policy = %policy, authenticated = ids.user_id.is_some(), "starting active scan");
        let mut params: Vec<(&str, String)> = match &ids.user_id {
            Some(user_id) => vec![
                ("url", target_url.to_string()),
                ("contextId", ids.context_id.clone()),
                ("userId", user_id.clone()),
                ("recurse", recurse),
            ],
            None => vec![
                ("url", target_url.to_string()),
                ("recurse", recurse),
                ("inScopeOnly", "false".to_string()),
            ],
        };
        if !policy.is_empty() {
            params.push(("scanPolicyName", policy));
        }
        let method = if ids.user_id.is_some() {
            "scanAsUser"
        } else {
            "scan"
        };
        let response = self
            .api
            .call("ascan", ApiCategory::Action, method, &params)
            .await?;
        let scan_id = response.element_value()?.to_string();
        self.emit(ScanEvent::PhaseStarted { phase: Phase::ActiveScan });

        let clock = self.clock(Phase::ActiveScan);
        loop {
            let status = self
                .api
                .call(
                    "ascan",
                    ApiCategory::View,
                    "status",
                    &[("scanId", scan_id.clone())],
                )
                .await?
                .element_as_int()?;
            let alerts = self.alert_count().await;
            let messages = self.message_count().await;
            info!(percent = status, alerts, messages, "active scan progress");
            self.emit(ScanEvent::PhaseProgress {
                phase: Phase::ActiveScan,
                percent: u8::try_from(status.clamp(0, 100)).ok(),
                alerts,
            });
            if status >= 100 {
                break;
            }
            clock.tick(cancel).await?;
        }
        self.emit(ScanEvent::PhaseCompleted { phase: Phase::ActiveScan });
        Ok(())
    }

    /// Alert-count snapshot for progress logging; a failure here must not
    /// abort a running scan.
    async fn alert_count(&self) -> i64 {
        self.counter_view("numberOfAlerts").await
    }

    async fn message_count(&self) -> i64 {
        self.counter_view("numberOfMessages").await
    }

    async fn counter_view(&self, method: &str) -> i64 {
        let result = self
            .api
            .call("core", ApiCategory::View, method, &[])
            .await
            .and_then(|r| r.element_as_int());
        match result {
            Ok(n) => n,
            Err(e) => {
                warn!(method, error = %e, "counter snapshot failed");
                -1
            }
        }
    }

    fn clock(&self, phase: Phase) -> PollClock {
        PollClock {
            phase,
            started: Instant::now(),
            interval: Duration::from_secs(self.config.poll_interval_secs),
            timeout: self.config.phase_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Bookkeeping for one phase's poll loop: interval sleep, overall timeout,
/// and cancellation.
struct PollClock {
    phase: Phase,
    started: Instant,
    interval: Duration,
    timeout: Option<Duration>,
}

impl PollClock {
    async fn tick(&self, cancel: &mut CancelToken) -> ScanResult<()> {
        if let Some(timeout) = self.timeout {
            if self.started.elapsed() >= timeout {
                return Err(ScanError::PhaseTimeout {
                    phase: self.phase.as_str(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
        tokio::select! {
            () = tokio::time::sleep(self.interval) => Ok(()),
            () = cancel.cancelled() => Err(ScanError::Cancelled),
        }
    }
}
