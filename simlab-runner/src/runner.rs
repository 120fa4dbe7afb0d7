//! Backtest runner: wires configuration, data, engine and analyzer together.
//!
//! Two entry points:
//! - `run_from_config()`: resolves the configured data source, then runs. Used by the CLI.
//! - `run_with_feed()`: takes a pre-loaded feed. Used by sweeps, which share
//!   one dataset across many configurations.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use simlab_core::domain::{EquityPoint, Fill, Order, OrderAuditEntry, TradeRecord};
use simlab_core::engine::{run_backtest, BarFeed, RunFailure, RunResult, RunStatus};
use simlab_core::ledger::PortfolioSnapshot;
use simlab_core::risk::AlertEvent;

use crate::config::{ConfigError, RunId, SimConfig};
use crate::data_loader::{dataset_hash, load_feed, LoadError};
use crate::metrics::PerformanceReport;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything one run produced, plus its analysis and provenance.
///
/// A failed run still yields a report: fills, equity and alerts up to the
/// last consistent step, with `failure` saying where and why it stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub config: SimConfig,
    pub strategy: String,
    pub status: RunStatus,
    pub failure: Option<RunFailure>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub steps: usize,
    pub performance: PerformanceReport,
    pub fills: Vec<Fill>,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub alerts: Vec<AlertEvent>,
    pub orders: Vec<Order>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub final_snapshot: PortfolioSnapshot,
}

impl BacktestReport {
    pub fn from_run(config: &SimConfig, result: RunResult, dataset_hash: &str, has_synthetic: bool) -> Self {
        let performance = PerformanceReport::compute(
            result.initial_capital,
            &result.equity_curve,
            &result.trades,
            &result.fills,
            &config.analysis,
        );
        let final_equity = result.final_equity();

        Self {
            schema_version: SCHEMA_VERSION,
            run_id: config.run_id(),
            dataset_hash: dataset_hash.to_string(),
            has_synthetic,
            config: config.clone(),
            strategy: result.strategy,
            status: result.status,
            failure: result.failure,
            initial_capital: result.initial_capital,
            final_equity,
            steps: result.steps,
            performance,
            fills: result.fills,
            trades: result.trades,
            equity_curve: result.equity_curve,
            alerts: result.alerts,
            orders: result.orders,
            audit_trail: result.audit_trail,
            final_snapshot: result.final_snapshot,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Load the configured data and run.
pub fn run_from_config(config: &SimConfig) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let loaded = load_feed(&config.run)?;
    Ok(run_loaded(config, &loaded.feed, &loaded.dataset_hash, loaded.has_synthetic))
}

/// Run against a caller-supplied feed. No I/O.
pub fn run_with_feed(config: &SimConfig, feed: &dyn BarFeed) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let hash = dataset_hash(feed);
    Ok(run_loaded(config, feed, &hash, false))
}

pub(crate) fn run_loaded(
    config: &SimConfig,
    feed: &dyn BarFeed,
    dataset_hash: &str,
    has_synthetic: bool,
) -> BacktestReport {
    let strategy = config.strategy.build();
    let result = run_backtest(feed, strategy.as_ref(), &config.engine_config());
    let report = BacktestReport::from_run(config, result, dataset_hash, has_synthetic);

    match &report.failure {
        None => info!(
            run_id = %&report.run_id[..12],
            strategy = %report.strategy,
            final_equity = report.final_equity,
            sharpe = ?report.performance.sharpe,
            "report ready"
        ),
        Some(failure) => warn!(
            run_id = %&report.run_id[..12],
            step = failure.step,
            error = %failure.error,
            "run failed; report holds partial results"
        ),
    }

    report
}
