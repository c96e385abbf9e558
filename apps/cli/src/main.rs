#![deny(warnings)]

//! Headless CLI: load a configuration file, run every requested scenario and
//! write the results as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "dt-sim")]
#[command(about = "Monte Carlo scenario runner for the digital twin")]
#[command(version = VERSION)]
struct Args {
    /// Path to the JSON configuration
    #[arg(long, required_unless_present = "print_template")]
    config: Option<PathBuf>,

    /// Where to write the results
    #[arg(long, default_value = "dt_results.json")]
    out: PathBuf,

    /// Print the bundled configuration template and exit
    #[arg(long)]
    print_template: bool,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Run the configuration at `config` and write pretty JSON to `out`.
/// Returns the written text.
fn simulate_file(config: &Path, out: &Path) -> Result<String> {
    let text = fs::read_to_string(config)
        .with_context(|| format!("reading config {}", config.display()))?;
    let cfg = twin_core::load_config_str(&text)
        .with_context(|| format!("loading config {}", config.display()))?;
    let results = twin_engine::run_all(&cfg).context("running scenarios")?;
    let json = serde_json::to_string_pretty(&results)?;
    fs::write(out, &json).with_context(|| format!("writing results {}", out.display()))?;
    info!(out = %out.display(), scenarios = results.len(), "results written");
    Ok(json)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only JSON.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.print_template {
        println!("{}", twin_engine::template_json());
        return Ok(());
    }

    let config = args
        .config
        .as_deref()
        .context("--config is required")?;
    info!(version = VERSION, config = %config.display(), "starting CLI");
    let json = simulate_file(config, &args.out)?;
    println!("{json}");
    Ok(())
}
