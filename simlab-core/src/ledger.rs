//! Portfolio ledger: cash, positions at average cost, realized P&L and the
//! equity curve.
//!
//! `apply` is the only mutator of balances. Every reducing fill closes part
//! of a position and produces a `TradeRecord`; every recorded equity point is
//! checked against the accounting identity
//! `equity == initial_capital + realized + unrealized - fees`.

use crate::domain::{EquityPoint, Fill, FillId, Position, Side, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Relative tolerance of the equity identity check.
pub const IDENTITY_TOLERANCE: f64 = 1e-6;

const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("fill {fill} would take cash to {resulting:.2}, below the floor of {floor:.2}")]
    CashBelowFloor {
        fill: FillId,
        resulting: f64,
        floor: f64,
    },

    #[error("fill {0} is malformed: {1}")]
    InvalidFill(FillId, String),

    #[error(
        "equity identity violated at step {step}: equity {equity:.6}, \
         capital + realized + unrealized - fees = {expected:.6}"
    )]
    IdentityViolation {
        step: usize,
        equity: f64,
        expected: f64,
    },
}

/// Read-only view of the portfolio handed to the strategy and risk manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub cash_floor: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub fees: f64,
    /// Every symbol the ledger has seen, flat ones included, with last price.
    pub positions: BTreeMap<String, Position>,
    /// Trailing equity values, oldest first, most recent last.
    pub equity_history: Vec<f64>,
}

impl PortfolioSnapshot {
    pub fn quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.quantity)
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.positions.get(symbol).map(|p| p.last_price)
    }

    pub fn cash_headroom(&self) -> f64 {
        self.cash - self.cash_floor
    }

    /// Sum of absolute market values across open positions.
    pub fn gross_exposure(&self) -> f64 {
        self.positions.values().map(|p| p.market_value().abs()).sum()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_flat())
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_capital: f64,
    cash_floor: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    realized_pnl: f64,
    fees: f64,
    slippage_cost: f64,
    fills: Vec<Fill>,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    /// Number of trailing equity values carried in snapshots.
    history_window: usize,
}

impl Ledger {
    pub fn new(initial_capital: f64, cash_floor: f64) -> Self {
        Self {
            initial_capital,
            cash_floor,
            cash: initial_capital,
            positions: BTreeMap::new(),
            realized_pnl: 0.0,
            fees: 0.0,
            slippage_cost: 0.0,
            fills: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            history_window: 0,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    // ── Mutation ───────────────────────────────────────────────────────

    /// Apply a fill to cash and the symbol's position.
    ///
    /// Same-direction fills average into the cost basis. Reducing fills
    /// realize `(price - avg_cost) * closed_qty * sign(position)` and record a
    /// trade; any remainder past flat opens a new position at the fill price.
    /// Nothing is mutated when the fill is rejected.
    pub fn apply(&mut self, fill: &Fill) -> Result<(), LedgerError> {
        if !(fill.quantity.is_finite() && fill.price.is_finite() && fill.fee.is_finite()) {
            return Err(LedgerError::InvalidFill(fill.id, "non-finite field".into()));
        }
        if fill.quantity == 0.0 || fill.price <= 0.0 {
            return Err(LedgerError::InvalidFill(
                fill.id,
                format!("quantity {} at price {}", fill.quantity, fill.price),
            ));
        }

        let resulting = self.cash + fill.cash_flow();
        if resulting < self.cash_floor - QTY_EPSILON {
            return Err(LedgerError::CashBelowFloor {
                fill: fill.id,
                resulting,
                floor: self.cash_floor,
            });
        }

        let pos = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::flat(fill.symbol.clone(), fill.price));
        let held = pos.quantity;
        let delta = fill.quantity;

        if held == 0.0 || held.signum() == delta.signum() {
            let total = held.abs() + delta.abs();
            pos.avg_cost = (pos.avg_cost * held.abs() + fill.price * delta.abs()) / total;
            pos.quantity = held + delta;
        } else {
            let closed = held.abs().min(delta.abs());
            let realized = (fill.price - pos.avg_cost) * closed * held.signum();
            pos.realized_pnl += realized;
            self.realized_pnl += realized;

            self.trades.push(TradeRecord {
                symbol: fill.symbol.clone(),
                side: if held > 0.0 { Side::Buy } else { Side::Sell },
                quantity: closed,
                entry_price: pos.avg_cost,
                exit_price: fill.price,
                realized_pnl: realized,
                fee: fill.fee,
                timestamp: fill.timestamp,
                step: fill.step,
                fill_id: fill.id,
            });

            let remaining = held + delta;
            if remaining.abs() < QTY_EPSILON {
                pos.quantity = 0.0;
                pos.avg_cost = 0.0;
            } else if remaining.signum() != held.signum() {
                pos.quantity = remaining;
                pos.avg_cost = fill.price;
            } else {
                pos.quantity = remaining;
            }
        }

        self.cash = resulting;
        self.fees += fill.fee;
        self.slippage_cost += fill.slippage_cost();
        self.fills.push(fill.clone());
        Ok(())
    }

    /// Mark a symbol at its latest close.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        self.positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol, price))
            .last_price = price;
    }

    /// Append an equity point and verify the accounting identity.
    pub fn record_equity(
        &mut self,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<EquityPoint, LedgerError> {
        let positions_value = self.positions_value();
        let point = EquityPoint {
            step,
            timestamp,
            cash: self.cash,
            positions_value,
            equity: self.cash + positions_value,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            fees: self.fees,
        };

        let gap = point.identity_gap(self.initial_capital);
        if gap.abs() > IDENTITY_TOLERANCE * point.equity.abs().max(1.0) {
            return Err(LedgerError::IdentityViolation {
                step,
                equity: point.equity,
                expected: point.equity - gap,
            });
        }

        self.equity_curve.push(point.clone());
        Ok(point)
    }

    // ── Views ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let start = self.equity_curve.len().saturating_sub(self.history_window);
        PortfolioSnapshot {
            cash: self.cash,
            cash_floor: self.cash_floor,
            equity: self.equity(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            fees: self.fees,
            positions: self.positions.clone(),
            equity_history: self.equity_curve[start..].iter().map(|p| p.equity).collect(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn cash_headroom(&self) -> f64 {
        self.cash - self.cash_floor
    }

    pub fn equity(&self) -> f64 {
        self.cash + self.positions_value()
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn fees(&self) -> f64 {
        self.fees
    }

    pub fn slippage_cost(&self) -> f64 {
        self.slippage_cost
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }
}
