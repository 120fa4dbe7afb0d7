//! Performance analyzer: pure functions over the equity curve and trade list.
//!
//! Nothing here touches the engine. Ratios that are undefined for the input
//! (zero variance, too few observations, no trades) are `None` rather than a
//! sentinel number.

use serde::{Deserialize, Serialize};
use simlab_core::domain::{EquityPoint, Fill, TradeRecord};
use simlab_core::risk::var;

/// How period returns are derived from consecutive equity points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Simple,
    Log,
}

/// Analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub return_kind: ReturnKind,
    /// Bars per year, used to annualize.
    pub periods_per_year: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    pub var_confidence: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            return_kind: ReturnKind::Simple,
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            var_confidence: 0.95,
        }
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub cagr: f64,
    pub annualized_volatility: f64,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
    pub calmar: Option<f64>,
    /// Largest peak-to-trough loss as a fraction of the peak, in [0, 1].
    pub max_drawdown: f64,
    pub value_at_risk: Option<f64>,
    pub expected_shortfall: Option<f64>,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub trade_count: usize,
    pub fill_count: usize,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
    pub total_slippage: f64,
}

impl PerformanceReport {
    /// Analyze a run. The initial capital is the first point of the equity
    /// series so the first step's move counts.
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
        fills: &[Fill],
        config: &AnalysisConfig,
    ) -> Self {
        let mut equity = Vec::with_capacity(equity_curve.len() + 1);
        equity.push(initial_capital);
        equity.extend(equity_curve.iter().map(|p| p.equity));

        let returns = period_returns(&equity, config.return_kind);
        let periods = returns.len();
        let cagr = cagr(&equity, periods, config.periods_per_year);
        let max_drawdown = max_drawdown(&equity);

        Self {
            total_return: total_return(&equity),
            cagr,
            annualized_volatility: std_dev(&returns) * config.periods_per_year.sqrt(),
            sharpe: sharpe_ratio(&returns, config.risk_free_rate, config.periods_per_year),
            sortino: sortino_ratio(&returns, config.risk_free_rate, config.periods_per_year),
            calmar: (max_drawdown > 0.0).then(|| cagr / max_drawdown),
            max_drawdown,
            value_at_risk: var::historical_var(&returns, config.var_confidence),
            expected_shortfall: var::expected_shortfall(&returns, config.var_confidence),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            fill_count: fills.len(),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
            total_fees: fills.iter().map(|f| f.fee).sum(),
            total_slippage: fills.iter().map(Fill::slippage_cost).sum(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Returns between consecutive equity values.
///
/// A non-positive starting value yields a zero return; a log return falls
/// back to the simple return when either side is non-positive.
pub fn period_returns(equity: &[f64], kind: ReturnKind) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| {
            if w[0] <= 0.0 {
                return 0.0;
            }
            match kind {
                ReturnKind::Log if w[1] > 0.0 => (w[1] / w[0]).ln(),
                _ => (w[1] - w[0]) / w[0],
            }
        })
        .collect()
}

/// (final - initial) / initial.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if equity.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// Compound annual growth over `periods` bars.
pub fn cagr(equity: &[f64], periods: usize, periods_per_year: f64) -> f64 {
    let (Some(&first), Some(&last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    if periods == 0 || first <= 0.0 || last <= 0.0 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let years = periods as f64 / periods_per_year;
    (last / first).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio.
///
/// Sharpe = mean(r - rf) / stdev(r - rf) × √periods_per_year, with the
/// annual risk-free rate spread evenly over the periods.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return None;
    }
    Some(mean(&excess) / std * periods_per_year.sqrt())
}

/// Annualized Sortino ratio: the Sharpe numerator over the sample standard
/// deviation of the negative excess returns.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.len() < 2 {
        return None;
    }
    let downside_std = std_dev(&downside);
    if downside_std < 1e-15 {
        return None;
    }
    Some(mean(&excess) / downside_std * periods_per_year.sqrt())
}

/// Maximum drawdown as a non-negative fraction of the running peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd.clamp(0.0, 1.0)
}

/// Share of closed trades with positive realized P&L.
pub fn win_rate(trades: &[TradeRecord]) -> Option<f64> {
    if trades.is_empty() {
        return None;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    Some(winners as f64 / trades.len() as f64)
}

/// Gross realized profit over gross realized loss; `None` without losses.
pub fn profit_factor(trades: &[TradeRecord]) -> Option<f64> {
    let gross_profit: f64 = trades.iter().map(|t| t.realized_pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.realized_pnl).max(0.0)).sum();
    (gross_loss > 1e-10).then(|| gross_profit / gross_loss)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use simlab_core::domain::{FillId, Side};

    fn make_trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "SPY".into(),
            side: Side::Buy,
            quantity: 10.0,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 10.0,
            realized_pnl: pnl,
            fee: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            step: 0,
            fill_id: FillId(0),
        }
    }

    // ── Returns ──

    #[test]
    fn simple_and_log_returns() {
        let eq = [100.0, 110.0, 99.0];
        let simple = period_returns(&eq, ReturnKind::Simple);
        assert!((simple[0] - 0.10).abs() < 1e-10);
        assert!((simple[1] + 0.10).abs() < 1e-10);

        let log = period_returns(&eq, ReturnKind::Log);
        assert!((log[0] - 1.1_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[100.0, 150.0]) - 0.5).abs() < 1e-10);
        assert_eq!(total_return(&[100.0]), 0.0);
    }

    #[test]
    fn cagr_one_year_doubling() {
        let mut eq = vec![100.0; 253];
        eq[252] = 200.0;
        assert!((cagr(&eq, 252, 252.0) - 1.0).abs() < 1e-10);
    }

    // ── Ratios ──

    #[test]
    fn sharpe_none_for_constant_returns() {
        assert_eq!(sharpe_ratio(&[0.01; 10], 0.0, 252.0), None);
        assert_eq!(sharpe_ratio(&[0.0; 10], 0.0, 252.0), None);
        assert_eq!(sharpe_ratio(&[0.01], 0.0, 252.0), None);
    }

    #[test]
    fn sharpe_sign_follows_mean() {
        let up = [0.01, 0.02, -0.005, 0.015];
        assert!(sharpe_ratio(&up, 0.0, 252.0).unwrap() > 0.0);
        let down: Vec<f64> = up.iter().map(|r| -r).collect();
        assert!(sharpe_ratio(&down, 0.0, 252.0).unwrap() < 0.0);
    }

    #[test]
    fn sortino_needs_two_losing_periods() {
        assert_eq!(sortino_ratio(&[0.01, 0.02, -0.01], 0.0, 252.0), None);
        assert!(sortino_ratio(&[0.03, -0.01, 0.02, -0.02], 0.0, 252.0).is_some());
    }

    #[test]
    fn sortino_uses_downside_deviation() {
        let returns = [0.04, -0.01, 0.03, -0.03];
        let downside_std = std_dev(&[-0.01, -0.03]);
        let expected = mean(&returns) / downside_std * 252.0_f64.sqrt();
        assert!((sortino_ratio(&returns, 0.0, 252.0).unwrap() - expected).abs() < 1e-10);
    }

    // ── Drawdown ──

    #[test]
    fn max_drawdown_is_positive_fraction() {
        let eq = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert!((max_drawdown(&eq) - 0.25).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_zero_when_monotonic() {
        assert_eq!(max_drawdown(&[100.0, 101.0, 105.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_capped_at_one() {
        assert_eq!(max_drawdown(&[100.0, -20.0]), 1.0);
    }

    // ── Trades ──

    #[test]
    fn win_rate_and_streaks() {
        let trades: Vec<_> = [10.0, 20.0, -5.0, 15.0, -3.0, -2.0, -1.0]
            .into_iter()
            .map(make_trade)
            .collect();
        assert!((win_rate(&trades).unwrap() - 3.0 / 7.0).abs() < 1e-10);
        assert_eq!(max_consecutive(&trades, true), 2);
        assert_eq!(max_consecutive(&trades, false), 3);
        assert_eq!(win_rate(&[]), None);
    }

    #[test]
    fn profit_factor_basic() {
        let trades = vec![make_trade(30.0), make_trade(-10.0)];
        assert!((profit_factor(&trades).unwrap() - 3.0).abs() < 1e-10);
        assert_eq!(profit_factor(&[make_trade(5.0)]), None);
    }

    // ── Report ──

    #[test]
    fn report_on_flat_run() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let curve: Vec<EquityPoint> = (0..5)
            .map(|step| EquityPoint {
                step,
                timestamp: ts,
                cash: 1_000.0,
                positions_value: 0.0,
                equity: 1_000.0,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                fees: 0.0,
            })
            .collect();
        let report = PerformanceReport::compute(1_000.0, &curve, &[], &[], &AnalysisConfig::default());
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.sharpe, None);
        assert_eq!(report.sortino, None);
        assert_eq!(report.calmar, None);
        assert_eq!(report.max_drawdown, 0.0);
        assert_eq!(report.win_rate, None);
        assert_eq!(report.value_at_risk, Some(0.0));
    }
}
