//! `zapdriver verdict`: the post-build threshold step.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use console::style;

use crate::domain::cancel::CancelToken;
use crate::domain::models::alert::Severity;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::LocalHost;
use crate::services::thresholds::Verdict;
use crate::services::verdict::{run_verdict, VerdictOutcome};

#[derive(Args, Debug)]
pub struct VerdictArgs {
    /// Path to the scan configuration file
    #[arg(short, long, default_value = "zapdriver.yaml")]
    pub config: PathBuf,
}

pub async fn execute(args: VerdictArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut cancel = CancelToken::never();
    let outcome = run_verdict(
        Arc::new(LocalHost),
        &config.workspace,
        &config.thresholds,
        config.scanner.startup_timeout_secs,
        &mut cancel,
    )
    .await
    .context("verdict step failed")?;

    if json_mode {
        print_json(&outcome);
    } else {
        print_table(&config, &outcome);
    }

    std::process::exit(outcome.verdict.exit_code());
}

fn print_json(outcome: &VerdictOutcome) {
    let payload = serde_json::json!({
        "verdict": outcome.verdict,
        "scan_build_success": outcome.scan_build_success,
        "counts": outcome.counts,
        "scaled": {
            "high": outcome.evaluation.scaled_high,
            "medium": outcome.evaluation.scaled_medium,
            "low": outcome.evaluation.scaled_low,
            "informational": outcome.evaluation.scaled_informational,
            "total": outcome.evaluation.scaled_total,
        },
    });
    println!("{payload}");
}

fn print_table(config: &crate::domain::models::config::ScanConfig, outcome: &VerdictOutcome) {
    let thresholds = &config.thresholds;
    let limit = |severity: Severity| match severity {
        Severity::High => thresholds.high,
        Severity::Medium => thresholds.medium,
        Severity::Low => thresholds.low,
        Severity::Informational => thresholds.informational,
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Severity", "Count", "Weight", "Scaled", "Soft limit"]);
    for severity in Severity::ALL {
        let t = limit(severity);
        table.add_row(vec![
            Cell::new(severity.as_str()),
            Cell::new(outcome.counts.get(severity)),
            Cell::new(t.weight),
            Cell::new(outcome.evaluation.scaled(severity)),
            Cell::new(t.soft_limit),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(outcome.counts.total()),
        Cell::new(""),
        Cell::new(outcome.evaluation.scaled_total),
        Cell::new(thresholds.cumulative_limit),
    ]);
    println!("{table}");

    if !outcome.scan_build_success {
        println!("{}", style("Scan step reported failures").red());
    }
    let verdict = match outcome.verdict {
        Verdict::Pass => style("PASS").green(),
        Verdict::Unstable => style("UNSTABLE").yellow(),
        Verdict::Fail => style("FAIL").red(),
    };
    println!("Verdict: {verdict}");
}
