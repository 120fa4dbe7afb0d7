//! End-to-end tests for the backtest orchestrator.
//!
//! Full runs over in-memory feeds: signal → risk check → execution → ledger
//! → risk monitoring → equity point, plus the failure paths for bad data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use simlab_core::domain::{
    Bar, OrderRequest, OrderRole, OrderStatus, Side, Signal, SignalSize,
};
use simlab_core::engine::{run_backtest, EngineConfig, FailureKind, RunStatus, VecFeed};
use simlab_core::execution::{CostModel, ExecutionConfig};
use simlab_core::risk::{AlertKind, LimitKind, LimitPolicy, RiskConfig, RiskLimit, Severity};
use simlab_core::strategy::{BuyAndHold, MaCrossover, NullStrategy, Scripted};

const EPS: f64 = 1e-9;

// ─── Helpers ──────────────────────────────────────────────────────────

fn day(n: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::days(n as i64)
}

fn bar(symbol: &str, n: usize, close: f64) -> Bar {
    Bar {
        symbol: symbol.into(),
        timestamp: day(n),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000_000.0,
    }
}

fn feed(symbol: &str, closes: &[f64]) -> VecFeed {
    VecFeed::from_bars(closes.iter().enumerate().map(|(i, c)| bar(symbol, i, *c)))
}

fn wave(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i as f64 * 0.2).sin() * 15.0).collect()
}

fn frictionless(capital: f64) -> EngineConfig {
    EngineConfig::new(capital).with_execution(ExecutionConfig::frictionless())
}

fn with_limits(config: EngineConfig, limits: Vec<RiskLimit>) -> EngineConfig {
    config.with_risk(RiskConfig {
        limits,
        ..RiskConfig::default()
    })
}

fn buy(symbol: &str, qty: f64) -> Signal {
    Signal::market(symbol, Side::Buy, SignalSize::Quantity(qty))
}

// ─── Basic runs ───────────────────────────────────────────────────────

#[test]
fn market_buy_with_flat_fee() {
    let config = EngineConfig::new(100_000.0).with_execution(ExecutionConfig {
        cost_model: CostModel::new(0.0, 0.0, 1.0, 0.0),
        ..ExecutionConfig::default()
    });
    let strategy = Scripted::new().at(0, buy("SPY", 10.0));
    let result = run_backtest(&feed("SPY", &[100.0, 100.0]), &strategy, &config);

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps, 2);
    assert_eq!(result.fills.len(), 1);
    let fill = &result.fills[0];
    assert!((fill.price - 100.0).abs() < EPS);
    assert!((fill.fee - 1.0).abs() < EPS);

    let point = &result.equity_curve[0];
    assert!((point.cash - 98_999.0).abs() < EPS);
    assert!((point.positions_value - 1_000.0).abs() < EPS);
    assert!((point.equity - 99_999.0).abs() < EPS);
    assert!((result.final_snapshot.quantity("SPY") - 10.0).abs() < EPS);
}

#[test]
fn null_strategy_keeps_capital() {
    let result = run_backtest(&feed("SPY", &wave(30)), &NullStrategy, &frictionless(50_000.0));
    assert!(result.is_completed());
    assert_eq!(result.equity_curve.len(), 30);
    assert!(result.fills.is_empty());
    assert!((result.final_equity() - 50_000.0).abs() < EPS);
}

#[test]
fn round_trip_realizes_pnl() {
    let strategy = Scripted::new()
        .at(0, buy("SPY", 10.0))
        .at(2, Signal::market("SPY", Side::Sell, SignalSize::Quantity(10.0)));
    let result = run_backtest(&feed("SPY", &[100.0, 105.0, 110.0, 108.0]), &strategy, &frictionless(10_000.0));

    assert_eq!(result.trades.len(), 1);
    assert!((result.trades[0].realized_pnl - 100.0).abs() < EPS);
    assert!((result.final_equity() - 10_100.0).abs() < EPS);
    assert!(result.final_snapshot.quantity("SPY").abs() < EPS);
}

#[test]
fn weight_sizing_uses_equity_and_close() {
    let result = run_backtest(
        &feed("SPY", &[100.0, 101.0]),
        &BuyAndHold { weight: 0.5 },
        &frictionless(10_000.0),
    );
    assert_eq!(result.fills.len(), 1);
    assert!((result.fills[0].quantity - 50.0).abs() < EPS);
}

#[test]
fn multi_symbol_steps_merge_by_timestamp() {
    let mut feed = feed("SPY", &[100.0, 101.0, 102.0]);
    feed.push(bar("QQQ", 1, 300.0));
    feed.push(bar("QQQ", 2, 301.0));
    let result = run_backtest(&feed, &NullStrategy, &frictionless(10_000.0));
    assert_eq!(result.steps, 3);
    assert_eq!(result.equity_curve[1].timestamp, day(1));
}

// ─── Risk gates ───────────────────────────────────────────────────────

#[test]
fn hard_position_limit_rejects_order() {
    let config = with_limits(
        frictionless(100_000.0),
        vec![RiskLimit::new(LimitKind::MaxPositionPct, 0.05, LimitPolicy::Hard)],
    );
    let strategy = Scripted::new().at(0, buy("SPY", 100.0));
    let result = run_backtest(&feed("SPY", &[100.0, 100.0]), &strategy, &config);

    assert!(result.is_completed());
    assert!(result.fills.is_empty());
    assert_eq!(result.orders.len(), 1);
    assert!(matches!(result.orders[0].status, OrderStatus::Rejected { .. }));

    let alert = &result.alerts[0];
    assert_eq!(alert.kind, AlertKind::MaxPositionPct);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.order_id, Some(result.orders[0].id));
    assert!((alert.observed - 0.10).abs() < EPS);
}

#[test]
fn soft_limit_warns_and_fills() {
    let config = with_limits(
        frictionless(100_000.0),
        vec![RiskLimit::new(LimitKind::MaxPositionPct, 0.05, LimitPolicy::Soft)],
    );
    let strategy = Scripted::new().at(0, buy("SPY", 100.0));
    let result = run_backtest(&feed("SPY", &[100.0, 100.0]), &strategy, &config);

    assert_eq!(result.fills.len(), 1);
    let warning = result
        .alerts
        .iter()
        .find(|a| a.order_id.is_some())
        .expect("pre-trade warning");
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.order_id, Some(result.fills[0].order_id));
}

#[test]
fn buying_power_rejection() {
    let strategy = Scripted::new().at(0, buy("SPY", 200.0));
    let result = run_backtest(&feed("SPY", &[100.0]), &strategy, &frictionless(10_000.0));

    assert!(result.fills.is_empty());
    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].kind, AlertKind::BuyingPower);
}

#[test]
fn buying_power_values_limit_orders_at_their_limit() {
    // 90 @ close 100 fits in 10k; 90 @ limit 120 does not.
    let signal = buy("SPY", 90.0).with_request(OrderRequest::limit(120.0));
    let strategy = Scripted::new().at(0, signal);
    let result = run_backtest(&feed("SPY", &[100.0, 101.0]), &strategy, &frictionless(10_000.0));

    assert!(result.fills.is_empty());
    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].kind, AlertKind::BuyingPower);
    assert!(matches!(result.orders[0].status, OrderStatus::Rejected { .. }));
}

#[test]
fn reducing_order_bypasses_position_limit() {
    let config = with_limits(
        frictionless(10_000.0),
        vec![RiskLimit::new(LimitKind::MaxPositionPct, 0.5, LimitPolicy::Hard)],
    );
    // 40 units is 40% at entry and 62% after the rally; selling part is
    // still allowed.
    let strategy = Scripted::new()
        .at(0, buy("SPY", 40.0))
        .at(1, Signal::market("SPY", Side::Sell, SignalSize::Quantity(10.0)));
    let result = run_backtest(&feed("SPY", &[100.0, 250.0]), &strategy, &config);
    assert_eq!(result.fills.len(), 2);
}

#[test]
fn hard_limit_with_trim_forces_reduction() {
    let config = with_limits(
        frictionless(10_000.0),
        vec![RiskLimit::new(LimitKind::MaxPositionPct, 0.5, LimitPolicy::Hard).with_trim()],
    );
    let strategy = Scripted::new().at(0, buy("SPY", 40.0));
    let result = run_backtest(&feed("SPY", &[100.0, 200.0, 200.0]), &strategy, &config);

    // Step 1: 8,000 of 14,000 equity is 57%; 35 units restore 50%.
    let breach = result
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::MaxPositionPct)
        .expect("breach alert");
    assert_eq!(breach.step, 1);
    assert_eq!(breach.forced_reduction, Some(5.0));

    assert_eq!(result.fills.len(), 2);
    let trim = &result.fills[1];
    assert_eq!(trim.step, 1);
    assert!((trim.quantity + 5.0).abs() < EPS);
    let order = result.orders.iter().find(|o| o.id == trim.order_id).unwrap();
    assert_eq!(order.role, OrderRole::ForcedReduction);
    assert!((result.final_snapshot.quantity("SPY") - 35.0).abs() < EPS);

    // The breach clears at step 2 once the trim is in the books.
    assert!(result
        .alerts
        .iter()
        .any(|a| a.kind == AlertKind::LimitCleared && a.step == 2));
}

#[test]
fn var_ceiling_blocks_new_risk_in_a_falling_market() {
    let config = with_limits(
        frictionless(10_000.0),
        vec![RiskLimit::new(LimitKind::VarCeiling, 0.01, LimitPolicy::Hard)],
    );
    let closes: Vec<f64> = (0..10).map(|i| 100.0 * 0.9_f64.powi(i)).collect();
    let strategy = Scripted::new().at(0, buy("SPY", 50.0)).at(8, buy("SPY", 1.0));
    let result = run_backtest(&feed("SPY", &closes), &strategy, &config);

    assert_eq!(result.fills.len(), 1);
    let rejection = result
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::VarCeiling && a.order_id.is_some())
        .expect("VaR rejection");
    assert_eq!(rejection.step, 8);
    assert!(rejection.observed > 0.01);

    // Post-trade monitoring flagged the breach before the order arrived.
    assert!(result
        .alerts
        .iter()
        .any(|a| a.kind == AlertKind::VarCeiling && a.order_id.is_none() && a.step < 8));
}

#[test]
fn signal_without_bar_is_rejected_as_invalid() {
    let strategy = Scripted::new().at(0, buy("QQQ", 1.0));
    let result = run_backtest(&feed("SPY", &[100.0, 101.0]), &strategy, &frictionless(10_000.0));

    assert!(result.is_completed());
    assert!(result.fills.is_empty());
    assert_eq!(result.alerts[0].kind, AlertKind::InvalidOrder);
    assert!(matches!(result.orders[0].status, OrderStatus::Rejected { .. }));
}

#[test]
fn invalid_limit_price_is_rejected() {
    let signal = buy("SPY", 5.0).with_request(OrderRequest::limit(-1.0));
    let strategy = Scripted::new().at(0, signal);
    let result = run_backtest(&feed("SPY", &[100.0, 101.0]), &strategy, &frictionless(10_000.0));
    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].kind, AlertKind::InvalidOrder);
}

// ─── Failures ─────────────────────────────────────────────────────────

#[test]
fn malformed_bar_fails_run_with_partial_results() {
    let mut bars: Vec<Bar> = (0..4).map(|i| bar("SPY", i, 100.0)).collect();
    bars[2].high = 90.0;
    let strategy = Scripted::new().at(0, buy("SPY", 10.0));
    let result = run_backtest(&VecFeed::from_bars(bars), &strategy, &frictionless(10_000.0));

    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::DataGapOrDisorder);
    assert_eq!(failure.step, 2);
    assert_eq!(failure.timestamp, Some(day(2)));
    assert_eq!(result.steps, 2);
    assert_eq!(result.equity_curve.len(), 2);
    assert_eq!(result.fills.len(), 1);
    assert!((failure.snapshot.quantity("SPY") - 10.0).abs() < EPS);
}

#[test]
fn out_of_order_bars_fail_run() {
    let bars = vec![bar("SPY", 0, 100.0), bar("SPY", 2, 101.0), bar("SPY", 1, 102.0)];
    let result = run_backtest(&VecFeed::from_bars(bars), &NullStrategy, &frictionless(10_000.0));

    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::DataGapOrDisorder);
    assert_eq!(failure.step, 2);
    assert_eq!(result.equity_curve.len(), 2);
}

#[test]
fn empty_feed_completes_with_no_steps() {
    let result = run_backtest(&VecFeed::new(), &NullStrategy, &frictionless(10_000.0));
    assert!(result.is_completed());
    assert_eq!(result.steps, 0);
    assert!((result.final_equity() - 10_000.0).abs() < EPS);
}

// ─── Invariants ───────────────────────────────────────────────────────

#[test]
fn equity_identity_holds_every_step() {
    let config = EngineConfig::new(100_000.0);
    let strategy = MaCrossover::new(3, 8).with_weight(0.9);
    let result = run_backtest(&feed("SPY", &wave(200)), &strategy, &config);

    assert!(result.is_completed());
    assert!(!result.trades.is_empty());
    for point in &result.equity_curve {
        assert!(
            point.identity_gap(100_000.0).abs() < 1e-6 * point.equity,
            "identity broken at step {}",
            point.step
        );
        assert!(point.cash >= -EPS);
    }
}

#[test]
fn identical_runs_produce_identical_results() {
    let mut feed = feed("SPY", &wave(120));
    for (i, close) in wave(120).iter().enumerate() {
        feed.push(bar("QQQ", i, close * 2.5 + (i % 7) as f64));
    }
    let config = with_limits(
        EngineConfig::new(250_000.0),
        vec![RiskLimit::new(LimitKind::MaxConcentrationPct, 0.6, LimitPolicy::Soft)],
    );
    let strategy = MaCrossover::new(2, 5);

    let a = run_backtest(&feed, &strategy, &config);
    let b = run_backtest(&feed, &strategy, &config);
    assert_eq!(a.fills, b.fills);
    assert_eq!(a.equity_curve, b.equity_curve);
    assert_eq!(a.alerts, b.alerts);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
