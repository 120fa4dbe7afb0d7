//! Reporting and export: JSON, CSV and Markdown artifacts.
//!
//! - **JSON**: the full `BacktestReport` with schema versioning
//! - **CSV**: fills, equity curve, alerts, trades, order audit, sweep summary
//! - **Markdown**: a human-readable single-run summary
//!
//! Unknown (newer) schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use simlab_core::domain::{EquityPoint, Fill, OrderAuditEntry, OrderStatus, TradeRecord};
use simlab_core::risk::AlertEvent;

use crate::runner::{BacktestReport, SCHEMA_VERSION};
use crate::sweep::SweepResults;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a report, rejecting schema versions newer than this build.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.precision$}"))
}

/// Columns: fill_id, order_id, step, timestamp, symbol, side, quantity,
/// price, reference_price, slippage, fee, liquidity_limited
pub fn export_fills_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fill_id",
        "order_id",
        "step",
        "timestamp",
        "symbol",
        "side",
        "quantity",
        "price",
        "reference_price",
        "slippage",
        "fee",
        "liquidity_limited",
    ])?;

    for f in fills {
        wtr.write_record([
            &f.id.0.to_string(),
            &f.order_id.0.to_string(),
            &f.step.to_string(),
            &f.timestamp.to_rfc3339(),
            &f.symbol,
            &f.side().to_string(),
            &format!("{:.6}", f.quantity.abs()),
            &format!("{:.6}", f.price),
            &format!("{:.6}", f.reference_price),
            &format!("{:.6}", f.slippage),
            &format!("{:.2}", f.fee),
            &f.liquidity_limited.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "step",
        "timestamp",
        "cash",
        "positions_value",
        "equity",
        "realized_pnl",
        "unrealized_pnl",
        "fees",
    ])?;
    for p in equity_curve {
        wtr.write_record([
            &p.step.to_string(),
            &p.timestamp.to_rfc3339(),
            &format!("{:.2}", p.cash),
            &format!("{:.2}", p.positions_value),
            &format!("{:.2}", p.equity),
            &format!("{:.2}", p.realized_pnl),
            &format!("{:.2}", p.unrealized_pnl),
            &format!("{:.2}", p.fees),
        ])?;
    }
    finish(wtr)
}

pub fn export_alerts_csv(alerts: &[AlertEvent]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "step",
        "timestamp",
        "severity",
        "kind",
        "symbol",
        "observed",
        "threshold",
        "order_id",
        "forced_reduction",
        "message",
    ])?;
    for a in alerts {
        wtr.write_record([
            &a.step.to_string(),
            &a.timestamp.to_rfc3339(),
            &format!("{:?}", a.severity),
            &format!("{:?}", a.kind),
            a.symbol.as_deref().unwrap_or(""),
            &format!("{:.6}", a.observed),
            &format!("{:.6}", a.threshold),
            &a.order_id.map(|id| id.0.to_string()).unwrap_or_default(),
            &opt(a.forced_reduction, 6),
            &a.message,
        ])?;
    }
    finish(wtr)
}

pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "step",
        "timestamp",
        "symbol",
        "side",
        "quantity",
        "entry_price",
        "exit_price",
        "realized_pnl",
        "fee",
        "net_pnl",
        "return_pct",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.step.to_string(),
            &t.timestamp.to_rfc3339(),
            &t.symbol,
            &t.side.to_string(),
            &format!("{:.6}", t.quantity),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &format!("{:.2}", t.realized_pnl),
            &format!("{:.2}", t.fee),
            &format!("{:.2}", t.net_pnl()),
            &format!("{:.6}", t.return_pct()),
        ])?;
    }
    finish(wtr)
}

fn status_label(status: &OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Triggered => "TRIGGERED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled { .. } => "CANCELLED",
        OrderStatus::Expired => "EXPIRED",
        OrderStatus::Rejected { .. } => "REJECTED",
    }
}

/// One row per order state transition.
pub fn export_audit_csv(audit: &[OrderAuditEntry]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["order_id", "step", "from", "to", "reason"])?;
    for e in audit {
        wtr.write_record([
            e.order_id.0.to_string().as_str(),
            e.step.to_string().as_str(),
            e.from_status.as_ref().map_or("", status_label),
            status_label(&e.to_status),
            &e.reason,
        ])?;
    }
    finish(wtr)
}

/// One row per sweep run, in the sweep's run id order.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "run_id",
        "strategy",
        "status",
        "final_equity",
        "total_return",
        "sharpe",
        "sortino",
        "max_drawdown",
        "trades",
    ])?;
    for r in results.all() {
        let p = &r.performance;
        wtr.write_record([
            &r.run_id,
            &r.strategy,
            &format!("{:?}", r.status),
            &format!("{:.2}", r.final_equity),
            &format!("{:.6}", p.total_return),
            &opt(p.sharpe, 4),
            &opt(p.sortino, 4),
            &format!("{:.6}", p.max_drawdown),
            &p.trade_count.to_string(),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Directory name for a report: strategy plus the run id prefix, so
/// re-running the same configuration overwrites its own artifacts.
pub fn artifact_dir_name(report: &BacktestReport) -> String {
    let prefix = &report.run_id[..report.run_id.len().min(12)];
    format!("{}_{prefix}", report.strategy)
}

/// Save the artifact set for a run under `output_dir`:
/// - `report.json`: the full `BacktestReport`
/// - `fills.csv`, `equity.csv`, `alerts.csv`, `trades.csv`, `audit.csv`
/// - `summary.md`
///
/// Returns the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(artifact_dir_name(report));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("report.json", export_json(report)?),
        ("fills.csv", export_fills_csv(&report.fills)?),
        ("equity.csv", export_equity_csv(&report.equity_curve)?),
        ("alerts.csv", export_alerts_csv(&report.alerts)?),
        ("trades.csv", export_trades_csv(&report.trades)?),
        ("audit.csv", export_audit_csv(&report.audit_trail)?),
        ("summary.md", generate_summary(report)),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

// ─── Markdown summary ───────────────────────────────────────────────

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

pub fn generate_summary(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Run ID | {} |\n", report.run_id));
    md.push_str(&format!("| Strategy | {} |\n", report.config.strategy.label()));
    md.push_str(&format!("| Status | {:?} |\n", report.status));
    md.push_str(&format!("| Steps | {} |\n", report.steps));
    md.push_str(&format!("| Initial Capital | {:.2} |\n", report.initial_capital));
    md.push_str(&format!("| Final Equity | {:.2} |\n", report.final_equity));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    if report.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    if let Some(failure) = &report.failure {
        md.push_str("## Failure\n\n");
        md.push_str(&format!(
            "Stopped at step {} ({:?}): {}\n\n",
            failure.step, failure.kind, failure.error
        ));
    }

    let p = &report.performance;
    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", p.total_return * 100.0));
    md.push_str(&format!("| CAGR | {:.2}% |\n", p.cagr * 100.0));
    md.push_str(&format!("| Volatility | {:.2}% |\n", p.annualized_volatility * 100.0));
    md.push_str(&format!("| Sharpe | {} |\n", ratio(p.sharpe)));
    md.push_str(&format!("| Sortino | {} |\n", ratio(p.sortino)));
    md.push_str(&format!("| Calmar | {} |\n", ratio(p.calmar)));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", p.max_drawdown * 100.0));
    md.push_str(&format!("| VaR | {} |\n", pct(p.value_at_risk)));
    md.push_str(&format!("| Expected Shortfall | {} |\n", pct(p.expected_shortfall)));
    md.push_str(&format!("| Win Rate | {} |\n", pct(p.win_rate)));
    md.push_str(&format!("| Profit Factor | {} |\n", ratio(p.profit_factor)));
    md.push_str(&format!("| Trades | {} |\n", p.trade_count));
    md.push_str(&format!("| Fills | {} |\n", p.fill_count));
    md.push_str(&format!("| Fees | {:.2} |\n", p.total_fees));
    md.push_str(&format!("| Slippage | {:.2} |\n", p.total_slippage));
    md.push('\n');

    if !report.alerts.is_empty() {
        md.push_str("## Alerts\n\n");
        for a in &report.alerts {
            md.push_str(&format!("- step {} [{:?}] {}\n", a.step, a.severity, a.message));
        }
        md.push('\n');
    }

    md
}
