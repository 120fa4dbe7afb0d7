//! SimLab CLI: run backtests and parameter sweeps from TOML configs.
//!
//! Commands:
//! - `run`: execute one backtest and save its artifacts
//! - `sweep`: run a moving-average crossover grid in parallel
//! - `default-config`: print a fully populated default config
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use simlab_runner::data_loader::load_feed;
use simlab_runner::export::{export_json, export_sweep_csv, save_artifacts};
use simlab_runner::{run_from_config, run_sweep, BacktestReport, ParamGrid, SimConfig};

#[derive(Parser)]
#[command(name = "simlab", about = "SimLab: event-driven trading backtest simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest from a TOML config.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// CSV bar file, overriding `[run] data`.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the full report as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Sweep MA crossover fast/slow periods over the configured data.
    Sweep {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data: Option<PathBuf>,

        /// Fast periods, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = [5, 10, 20])]
        fast: Vec<usize>,

        /// Slow periods, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = [20, 50, 100])]
        slow: Vec<usize>,

        /// Write the sweep summary CSV here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output_dir,
            json,
        } => run_cmd(config.as_deref(), data, &output_dir, json),
        Commands::Sweep {
            config,
            data,
            fast,
            slow,
            output,
        } => sweep_cmd(config.as_deref(), data, ParamGrid::new(fast, slow), output.as_deref()),
        Commands::DefaultConfig => {
            let text = SimConfig::default()
                .to_toml()
                .context("failed to render default config")?;
            print!("{text}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, data: Option<PathBuf>) -> Result<SimConfig> {
    let mut config = match path {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if data.is_some() {
        config.run.data = data;
    }
    config.validate()?;
    Ok(config)
}

fn run_cmd(config_path: Option<&Path>, data: Option<PathBuf>, output_dir: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path, data)?;
    info!(run_id = %config.run_id(), strategy = %config.strategy.label(), "starting run");

    let report = run_from_config(&config)?;

    if json {
        println!("{}", export_json(&report)?);
    } else {
        print_summary(&report);
    }

    let run_dir = save_artifacts(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if !report.is_completed() {
        std::process::exit(2);
    }
    Ok(())
}

fn sweep_cmd(
    config_path: Option<&Path>,
    data: Option<PathBuf>,
    grid: ParamGrid,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path, data)?;
    let loaded = load_feed(&config.run)?;

    let results = run_sweep(&grid, &config, &loaded.feed)?;
    println!("{} runs ({} grid points)", results.len(), grid.size());

    for report in results.ranked_by_sharpe() {
        println!(
            "  {:<28} sharpe {:>8}  return {:>8.2}%  maxdd {:>6.2}%",
            report.config.strategy.label(),
            report
                .performance
                .sharpe
                .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}")),
            report.performance.total_return * 100.0,
            report.performance.max_drawdown * 100.0,
        );
    }
    if let Some(best) = results.best_by_sharpe() {
        println!("Best: {} ({})", best.config.strategy.label(), &best.run_id[..12]);
    }

    if let Some(path) = output {
        std::fs::write(path, export_sweep_csv(&results)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Sweep summary saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let p = &report.performance;
    let ratio = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"));

    println!("Run:           {}", &report.run_id[..12]);
    println!("Strategy:      {}", report.config.strategy.label());
    println!("Status:        {:?}", report.status);
    if let Some(failure) = &report.failure {
        println!("Failure:       step {}: {}", failure.step, failure.error);
    }
    if report.has_synthetic {
        println!("Data:          SYNTHETIC");
    }
    println!("Steps:         {}", report.steps);
    println!("Final equity:  {:.2}", report.final_equity);
    println!("Total return:  {:.2}%", p.total_return * 100.0);
    println!("Sharpe:        {}", ratio(p.sharpe));
    println!("Sortino:       {}", ratio(p.sortino));
    println!("Max drawdown:  {:.2}%", p.max_drawdown * 100.0);
    println!("Trades:        {}", p.trade_count);
    println!("Fills:         {}", p.fill_count);
    println!("Alerts:        {}", report.alerts.len());
}
