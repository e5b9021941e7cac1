//! `zapdriver scan`: the pre/main build step.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::domain::cancel::CancelToken;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::LocalHost;
use crate::services::orchestrator::Orchestrator;
use crate::services::phases::{Phase, ScanEvent};

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Path to the scan configuration file
    #[arg(short, long, default_value = "zapdriver.yaml")]
    pub config: PathBuf,
}

pub async fn execute(args: ScanArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let (handle, mut cancel) = CancelToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ScanEvent>();
    let renderer = tokio::spawn(render_events(event_rx, json_mode));

    let orchestrator = Orchestrator::new(Arc::new(LocalHost), config, Some(event_tx));
    let outcome = orchestrator.run(&mut cancel).await;
    let _ = renderer.await;

    let outcome = outcome.context("scan step failed")?;

    if json_mode {
        let payload = serde_json::json!({
            "build_success": outcome.build_success,
            "alerts": outcome.counts,
            "handoff": outcome.handoff_path,
        });
        println!("{payload}");
    } else {
        println!();
        println!(
            "Alerts: {} high, {} medium, {} low, {} informational",
            outcome.counts.high,
            outcome.counts.medium,
            outcome.counts.low,
            outcome.counts.informational
        );
        println!("Handoff record: {}", outcome.handoff_path.display());
        if outcome.build_success {
            println!("{}", style("Scan step finished clean").green());
        } else {
            println!("{}", style("Scan step finished with failures").red());
        }
    }

    if outcome.build_success {
        Ok(())
    } else {
        anyhow::bail!("scan step finished with failures")
    }
}

/// Drain the phase event stream into progress bars (or JSON lines).
async fn render_events(mut rx: mpsc::UnboundedReceiver<ScanEvent>, json_mode: bool) {
    let multi = MultiProgress::new();
    let mut bars: HashMap<&'static str, ProgressBar> = HashMap::new();

    while let Some(event) = rx.recv().await {
        if json_mode {
            print_event_json(&event);
            continue;
        }
        match event {
            ScanEvent::PhaseSkipped { phase } => {
                multi.suspend(|| println!("{} skipped", phase));
            }
            ScanEvent::PhaseStarted { phase } => {
                let bar = multi.add(progress_bar(phase));
                bars.insert(phase.as_str(), bar);
            }
            ScanEvent::PhaseProgress {
                phase,
                percent,
                alerts,
            } => {
                if let Some(bar) = bars.get(phase.as_str()) {
                    if let Some(percent) = percent {
                        bar.set_position(u64::from(percent));
                    } else {
                        bar.tick();
                    }
                    bar.set_message(format!("{alerts} alerts"));
                }
            }
            ScanEvent::PhaseCompleted { phase } => {
                if let Some(bar) = bars.remove(phase.as_str()) {
                    bar.finish_with_message("done");
                }
            }
        }
    }
}

fn progress_bar(phase: Phase) -> ProgressBar {
    let bar = match phase {
        // The AJAX spider reports no percentage, only running/stopped.
        Phase::AjaxSpider => ProgressBar::new_spinner(),
        Phase::Spider | Phase::ActiveScan => ProgressBar::new(100),
    };
    bar.set_style(
        ProgressStyle::with_template("{prefix:>12} {bar:30} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix(phase.as_str().to_string());
    bar
}

fn print_event_json(event: &ScanEvent) {
    let payload = match event {
        ScanEvent::PhaseSkipped { phase } => {
            serde_json::json!({"event": "skipped", "phase": phase.as_str()})
        }
        ScanEvent::PhaseStarted { phase } => {
            serde_json::json!({"event": "started", "phase": phase.as_str()})
        }
        ScanEvent::PhaseProgress {
            phase,
            percent,
            alerts,
        } => serde_json::json!({
            "event": "progress",
            "phase": phase.as_str(),
            "percent": percent,
            "alerts": alerts,
        }),
        ScanEvent::PhaseCompleted { phase } => {
            serde_json::json!({"event": "completed", "phase": phase.as_str()})
        }
    };
    println!("{payload}");
}
