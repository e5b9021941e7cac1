//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zapdriver")]
#[command(about = "CI-oriented DAST scan orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the scanner and run the configured scan phases
    Scan(commands::scan::ScanArgs),

    /// Evaluate the previous scan step against the alert thresholds
    Verdict(commands::verdict::VerdictArgs),
}

/// Render a top-level error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let payload = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{payload}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
