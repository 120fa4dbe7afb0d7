//! Bar-by-bar orchestrator: the heart of the backtest.
//!
//! Six phases per global step:
//! 1. Pull and validate the step's bars (k-way merge across symbols)
//! 2. Extend the visible history and mark positions at the close
//! 3. Execute resting orders against each bar, symbol by symbol
//! 4. Ask the strategy for signals; size, risk-check and submit them
//! 5. Post-trade risk check and forced reductions
//! 6. Record the equity point and verify the accounting identity

use crate::domain::{Bar, OrderId, OrderTicket, Signal, SignalSize};
use crate::execution::{BarExecution, ExecutionSimulator, OrderError};
use crate::ledger::Ledger;
use crate::risk::{reducing_side, RiskDecision, RiskManager};
use crate::strategy::{BarHistory, Strategy};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::config::EngineConfig;
use super::feed::{BarFeed, MergedFeed};
use super::state::{FatalError, RunFailure, RunResult, RunStatus};

/// Run a backtest of `strategy` over `feed`.
pub fn run_backtest(feed: &dyn BarFeed, strategy: &dyn Strategy, config: &EngineConfig) -> RunResult {
    Backtest::new(config).run(feed, strategy)
}

/// A single run. Owns its ledger, risk manager, simulator and history;
/// nothing is shared between runs.
pub struct Backtest<'a> {
    config: &'a EngineConfig,
    status: RunStatus,
    ledger: Ledger,
    risk: RiskManager,
    simulator: ExecutionSimulator,
    history: BarHistory,
}

impl<'a> Backtest<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            status: RunStatus::Initialized,
            ledger: Ledger::new(config.initial_capital, config.cash_floor)
                .with_history_window(config.risk.var_window),
            risk: RiskManager::new(config.risk.clone()),
            simulator: ExecutionSimulator::new(config.execution.clone()),
            history: BarHistory::new(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn run(mut self, feed: &dyn BarFeed, strategy: &dyn Strategy) -> RunResult {
        self.status = RunStatus::Running;
        info!(strategy = strategy.name(), capital = self.config.initial_capital, "backtest started");

        let mut steps = 0;
        let mut failure = None;
        for (step, item) in MergedFeed::new(feed).enumerate() {
            let timestamp = item.as_ref().ok().and_then(|bars| bars.first()).map(|b| b.timestamp);
            let outcome = item
                .map_err(FatalError::from)
                .and_then(|bars| self.step(step, &bars, strategy));
            if let Err(err) = outcome {
                let timestamp = match &err {
                    FatalError::DataGapOrDisorder(feed_err) => Some(feed_err.timestamp()),
                    _ => timestamp,
                };
                error!(step, error = %err, "backtest failed");
                failure = Some(RunFailure {
                    step,
                    timestamp,
                    kind: err.kind(),
                    error: err.to_string(),
                    snapshot: self.ledger.snapshot(),
                });
                break;
            }
            steps += 1;
        }

        self.status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        info!(
            status = ?self.status,
            steps,
            fills = self.ledger.fills().len(),
            equity = self.ledger.equity(),
            "backtest finished"
        );

        let book = self.simulator.book();
        RunResult {
            status: self.status,
            failure,
            strategy: strategy.name().to_string(),
            initial_capital: self.config.initial_capital,
            steps,
            fills: self.ledger.fills().to_vec(),
            trades: self.ledger.trades().to_vec(),
            equity_curve: self.ledger.equity_curve().to_vec(),
            orders: book.orders().cloned().collect(),
            audit_trail: book.audit_trail().to_vec(),
            final_snapshot: self.ledger.snapshot(),
            alerts: self.risk.into_alerts(),
        }
    }

    fn step(&mut self, step: usize, bars: &[Bar], strategy: &dyn Strategy) -> Result<(), FatalError> {
        let Some(timestamp) = bars.first().map(|b| b.timestamp) else {
            return Ok(());
        };

        self.history.push_step(timestamp, bars);
        for bar in bars {
            self.ledger.mark(&bar.symbol, bar.close);
        }

        for bar in bars {
            let execution = self
                .simulator
                .process_bar(bar, step, self.ledger.cash_headroom())?;
            self.settle(execution, step, timestamp)?;
        }

        let signals = strategy.generate_signals(&self.history, &self.ledger.snapshot());
        for signal in signals {
            self.handle_signal(signal, bars, step, timestamp)?;
        }

        let alerts = self
            .risk
            .post_trade_check(&self.ledger.snapshot(), step, timestamp);
        for alert in alerts {
            if let (Some(qty), Some(symbol)) = (alert.forced_reduction, alert.symbol) {
                self.force_reduction(&symbol, qty, bars, step, timestamp)?;
            }
        }

        let point = self.ledger.record_equity(step, timestamp)?;
        debug!(step, equity = point.equity, cash = point.cash, "step complete");
        Ok(())
    }

    /// Size, check and submit one strategy signal.
    fn handle_signal(
        &mut self,
        signal: Signal,
        bars: &[Bar],
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), FatalError> {
        let bar = bars.iter().find(|b| b.symbol == signal.symbol);
        let quantity = match (signal.size, bar) {
            (SignalSize::Quantity(q), _) => q,
            (SignalSize::Weight(w), Some(bar)) => (w * self.ledger.equity() / bar.close).floor(),
            (SignalSize::Weight(_), None) => 0.0,
        };
        let ticket = OrderTicket {
            symbol: signal.symbol,
            side: signal.side,
            quantity,
            request: signal.request,
            time_in_force: signal.time_in_force,
            forced: false,
        };

        let Some(bar) = bar else {
            let reason = format!("no bar for {} at this step", ticket.symbol);
            self.reject_invalid(&ticket, &reason, step, timestamp);
            return Ok(());
        };
        if let Err(OrderError::InvalidOrderParameters(reason)) = ExecutionSimulator::validate(&ticket) {
            self.reject_invalid(&ticket, &reason, step, timestamp);
            return Ok(());
        }

        let reference_price = ticket.reference_price(bar.close);
        match self
            .risk
            .pre_trade_check(&ticket, reference_price, &self.ledger.snapshot())
        {
            RiskDecision::Reject(reason) => {
                let order_id = self
                    .simulator
                    .record_rejection(&ticket, step, &reason.to_string());
                self.risk
                    .alert_rejection(&reason, &ticket.symbol, order_id, step, timestamp);
                Ok(())
            }
            RiskDecision::Accept { warnings } => {
                let Some(order_id) = self.submit(&ticket, bar, step, timestamp)? else {
                    return Ok(());
                };
                for breach in &warnings {
                    self.risk
                        .alert_soft_breach(breach, Some(order_id), step, timestamp);
                }
                Ok(())
            }
        }
    }

    /// Submit a forced MARKET reduction of `qty` units of `symbol`.
    fn force_reduction(
        &mut self,
        symbol: &str,
        qty: f64,
        bars: &[Bar],
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), FatalError> {
        let held = self.ledger.position(symbol).map_or(0.0, |p| p.quantity);
        let qty = qty.min(held.abs());
        let Some(bar) = bars.iter().find(|b| b.symbol == symbol) else {
            warn!(step, %symbol, "no bar to trim against, reduction deferred");
            return Ok(());
        };
        if qty <= 0.0 {
            return Ok(());
        }
        let mut ticket = OrderTicket::market(symbol, reducing_side(held), qty);
        ticket.forced = true;
        info!(step, %symbol, qty, "submitting forced reduction");
        self.submit(&ticket, bar, step, timestamp)?;
        Ok(())
    }

    /// Hand an accepted ticket to the simulator and settle immediate fills.
    fn submit(
        &mut self,
        ticket: &OrderTicket,
        bar: &Bar,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<OrderId>, FatalError> {
        match self
            .simulator
            .submit(ticket, bar, step, self.ledger.cash_headroom())
        {
            Ok(submission) => {
                let primary = submission.primary_id();
                self.settle(submission.execution, step, timestamp)?;
                Ok(primary)
            }
            Err(OrderError::InvalidOrderParameters(reason)) => {
                self.reject_invalid(ticket, &reason, step, timestamp);
                Ok(None)
            }
            Err(OrderError::Book(err)) => Err(err.into()),
        }
    }

    fn reject_invalid(&mut self, ticket: &OrderTicket, reason: &str, step: usize, timestamp: DateTime<Utc>) {
        let order_id = self.simulator.record_rejection(ticket, step, reason);
        self.risk
            .alert_invalid_order(&ticket.symbol, order_id, reason, step, timestamp);
    }

    /// Apply fills to the ledger in order and log cash shortfalls.
    fn settle(&mut self, execution: BarExecution, step: usize, timestamp: DateTime<Utc>) -> Result<(), FatalError> {
        for fill in &execution.fills {
            self.ledger.apply(fill)?;
        }
        for rejection in &execution.cash_rejections {
            self.risk.alert_cash_shortfall(rejection, step, timestamp);
        }
        Ok(())
    }
}
