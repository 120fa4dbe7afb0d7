//! Risk manager: gates every order before submission and monitors the
//! portfolio after every step.
//!
//! Every check is a deterministic function of the ticket, a reference price
//! and the portfolio snapshot. Orders that reduce an existing position are
//! never blocked by position, concentration or VaR limits; buying power is
//! always enforced.

pub mod limits;
pub mod var;

pub use limits::{
    AlertEvent, AlertKind, Breach, LimitKind, LimitPolicy, LimitScope, RiskLimit, Severity,
};

use crate::domain::{OrderId, OrderTicket, Side};
use crate::execution::CashRejection;
use crate::ledger::PortfolioSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub limits: Vec<RiskLimit>,
    /// Number of trailing equity returns used for VaR.
    pub var_window: usize,
    pub var_confidence: f64,
    /// VaR is not evaluated on fewer returns than this.
    pub var_min_observations: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            limits: Vec::new(),
            var_window: 20,
            var_confidence: 0.95,
            var_min_observations: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("risk limit exceeded: {}", .0.describe())]
    LimitExceeded(Breach),

    #[error("insufficient buying power: order needs {required:.2}, headroom is {available:.2}")]
    BuyingPower { required: f64, available: f64 },
}

impl RejectReason {
    pub fn alert_kind(&self) -> AlertKind {
        match self {
            RejectReason::LimitExceeded(breach) => breach.kind.into(),
            RejectReason::BuyingPower { .. } => AlertKind::BuyingPower,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    /// Accepted; soft breaches ride along as warnings.
    Accept { warnings: Vec<Breach> },
    Reject(RejectReason),
}

impl RiskDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, RiskDecision::Accept { .. })
    }
}

type BreachKey = (usize, Option<String>);

pub struct RiskManager {
    config: RiskConfig,
    /// Breaches present at the last post-trade check.
    active: BTreeSet<BreachKey>,
    alerts: Vec<AlertEvent>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            active: BTreeSet::new(),
            alerts: Vec::new(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn alerts(&self) -> &[AlertEvent] {
        &self.alerts
    }

    pub fn into_alerts(self) -> Vec<AlertEvent> {
        self.alerts
    }

    // ── Pre-trade ──────────────────────────────────────────────────────

    /// Decide whether `ticket` may be submitted at `reference_price`.
    pub fn pre_trade_check(
        &self,
        ticket: &OrderTicket,
        reference_price: f64,
        snapshot: &PortfolioSnapshot,
    ) -> RiskDecision {
        let required = ticket.signed_quantity() * reference_price;
        let available = snapshot.cash_headroom();
        if required > available {
            return RiskDecision::Reject(RejectReason::BuyingPower {
                required,
                available,
            });
        }

        let held = snapshot.quantity(&ticket.symbol);
        let after = held + ticket.signed_quantity();
        let reducing = after.abs() <= held.abs() && (after == 0.0 || after.signum() == held.signum());
        if reducing || ticket.forced {
            return RiskDecision::Accept { warnings: Vec::new() };
        }

        let mut warnings = Vec::new();
        for limit in &self.config.limits {
            if !limit.applies_to(&ticket.symbol) {
                continue;
            }
            let observed = match limit.kind {
                LimitKind::MaxPositionPct => {
                    Some(position_pct(after, reference_price, snapshot.equity))
                }
                LimitKind::MaxConcentrationPct => {
                    let mut exposures = exposures(snapshot);
                    exposures.insert(ticket.symbol.clone(), (after * reference_price).abs());
                    concentration(&exposures, &ticket.symbol)
                }
                LimitKind::VarCeiling => self.portfolio_var(snapshot),
            };
            let Some(observed) = observed.filter(|o| *o > limit.threshold) else {
                continue;
            };
            let breach = Breach {
                kind: limit.kind,
                policy: limit.policy,
                symbol: match limit.kind {
                    LimitKind::VarCeiling => None,
                    _ => Some(ticket.symbol.clone()),
                },
                observed,
                threshold: limit.threshold,
            };
            if limit.is_hard() {
                return RiskDecision::Reject(RejectReason::LimitExceeded(breach));
            }
            warnings.push(breach);
        }
        RiskDecision::Accept { warnings }
    }

    // ── Post-trade ─────────────────────────────────────────────────────

    /// Re-evaluate every limit against the current portfolio.
    ///
    /// Emits an alert when a breach appears (Warning for soft limits,
    /// Critical for hard ones) and an Info alert when it clears. Hard
    /// position and concentration limits with `trim` set carry the minimum
    /// reduction that restores the threshold.
    pub fn post_trade_check(
        &mut self,
        snapshot: &PortfolioSnapshot,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let mut observed: BTreeMap<BreachKey, (f64, Option<f64>)> = BTreeMap::new();
        let exposures = exposures(snapshot);

        for (idx, limit) in self.config.limits.iter().enumerate() {
            match limit.kind {
                LimitKind::MaxPositionPct => {
                    for pos in snapshot.open_positions().filter(|p| limit.applies_to(&p.symbol)) {
                        let pct = position_pct(pos.quantity, pos.last_price, snapshot.equity);
                        if pct > limit.threshold {
                            let target = (limit.threshold * snapshot.equity / pos.last_price).max(0.0);
                            let trim = reduction_to(pos.quantity.abs(), target);
                            observed.insert((idx, Some(pos.symbol.clone())), (pct, Some(trim)));
                        }
                    }
                }
                LimitKind::MaxConcentrationPct => {
                    for pos in snapshot.open_positions().filter(|p| limit.applies_to(&p.symbol)) {
                        let Some(share) = concentration(&exposures, &pos.symbol) else {
                            continue;
                        };
                        if share > limit.threshold && limit.threshold < 1.0 {
                            let others: f64 = exposures
                                .iter()
                                .filter(|(s, _)| **s != pos.symbol)
                                .map(|(_, e)| e)
                                .sum();
                            let target_value = limit.threshold * others / (1.0 - limit.threshold);
                            let trim = reduction_to(pos.quantity.abs(), target_value / pos.last_price);
                            observed.insert((idx, Some(pos.symbol.clone())), (share, Some(trim)));
                        }
                    }
                }
                LimitKind::VarCeiling => {
                    let applies = match &limit.scope {
                        LimitScope::Global => true,
                        LimitScope::Instrument(s) => snapshot.quantity(s) != 0.0,
                    };
                    if let Some(var) = self.portfolio_var(snapshot).filter(|_| applies) {
                        if var > limit.threshold {
                            observed.insert((idx, None), (var, None));
                        }
                    }
                }
            }
        }

        let mut emitted = Vec::new();
        for (key, (value, trim)) in &observed {
            if self.active.contains(key) {
                continue;
            }
            let limit = &self.config.limits[key.0];
            let breach = Breach {
                kind: limit.kind,
                policy: limit.policy,
                symbol: key.1.clone(),
                observed: *value,
                threshold: limit.threshold,
            };
            let forced_reduction = trim.filter(|q| limit.is_hard() && limit.trim && *q > 0.0);
            let severity = if limit.is_hard() {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let mut message = breach.describe();
            if let Some(q) = forced_reduction {
                message.push_str(&format!("; trimming {q}"));
            }
            warn!(step, %message, "risk limit breached");
            emitted.push(AlertEvent {
                step,
                timestamp,
                severity,
                kind: limit.kind.into(),
                symbol: breach.symbol,
                observed: *value,
                threshold: limit.threshold,
                message,
                order_id: None,
                forced_reduction,
            });
        }

        let cleared: Vec<BreachKey> = self
            .active
            .iter()
            .filter(|key| !observed.contains_key(*key))
            .cloned()
            .collect();
        for key in cleared {
            let limit = &self.config.limits[key.0];
            let message = match &key.1 {
                Some(symbol) => format!("{:?} limit on {symbol} back within {:.4}", limit.kind, limit.threshold),
                None => format!("{:?} limit back within {:.4}", limit.kind, limit.threshold),
            };
            info!(step, %message, "risk limit cleared");
            emitted.push(AlertEvent {
                step,
                timestamp,
                severity: Severity::Info,
                kind: AlertKind::LimitCleared,
                symbol: key.1.clone(),
                observed: 0.0,
                threshold: limit.threshold,
                message,
                order_id: None,
                forced_reduction: None,
            });
        }

        self.active = observed.into_keys().collect();
        self.alerts.extend(emitted.iter().cloned());
        emitted
    }

    // ── Alert log ──────────────────────────────────────────────────────

    /// Log the alert accompanying a rejected order.
    pub fn alert_rejection(
        &mut self,
        reason: &RejectReason,
        symbol: &str,
        order_id: OrderId,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> AlertEvent {
        let (observed, threshold) = match reason {
            RejectReason::LimitExceeded(b) => (b.observed, b.threshold),
            RejectReason::BuyingPower {
                required,
                available,
            } => (*required, *available),
        };
        warn!(step, order = %order_id, %symbol, %reason, "order rejected");
        self.push(AlertEvent {
            step,
            timestamp,
            severity: Severity::Critical,
            kind: reason.alert_kind(),
            symbol: Some(symbol.to_string()),
            observed,
            threshold,
            message: reason.to_string(),
            order_id: Some(order_id),
            forced_reduction: None,
        })
    }

    /// Log a soft-limit warning for an accepted order.
    pub fn alert_soft_breach(
        &mut self,
        breach: &Breach,
        order_id: Option<OrderId>,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> AlertEvent {
        self.push(AlertEvent {
            step,
            timestamp,
            severity: Severity::Warning,
            kind: breach.kind.into(),
            symbol: breach.symbol.clone(),
            observed: breach.observed,
            threshold: breach.threshold,
            message: breach.describe(),
            order_id,
            forced_reduction: None,
        })
    }

    /// Log a fill the simulator refused because cash would breach the floor.
    pub fn alert_cash_shortfall(
        &mut self,
        rejection: &CashRejection,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> AlertEvent {
        self.push(AlertEvent {
            step,
            timestamp,
            severity: Severity::Critical,
            kind: AlertKind::BuyingPower,
            symbol: Some(rejection.symbol.clone()),
            observed: rejection.required,
            threshold: rejection.available,
            message: format!(
                "fill needs {:.2} but only {:.2} is available above the cash floor",
                rejection.required, rejection.available
            ),
            order_id: Some(rejection.order_id),
            forced_reduction: None,
        })
    }

    /// Log an order refused for malformed parameters.
    pub fn alert_invalid_order(
        &mut self,
        symbol: &str,
        order_id: OrderId,
        message: &str,
        step: usize,
        timestamp: DateTime<Utc>,
    ) -> AlertEvent {
        warn!(step, order = %order_id, %symbol, %message, "invalid order rejected");
        self.push(AlertEvent {
            step,
            timestamp,
            severity: Severity::Warning,
            kind: AlertKind::InvalidOrder,
            symbol: Some(symbol.to_string()),
            observed: 0.0,
            threshold: 0.0,
            message: message.to_string(),
            order_id: Some(order_id),
            forced_reduction: None,
        })
    }

    fn push(&mut self, alert: AlertEvent) -> AlertEvent {
        self.alerts.push(alert.clone());
        alert
    }

    /// VaR over the trailing window, with the current equity as the last point.
    fn portfolio_var(&self, snapshot: &PortfolioSnapshot) -> Option<f64> {
        let mut series = snapshot.equity_history.clone();
        series.push(snapshot.equity);
        let returns = var::simple_returns(&series);
        let start = returns.len().saturating_sub(self.config.var_window);
        let window = &returns[start..];
        if window.len() < self.config.var_min_observations.max(1) {
            return None;
        }
        var::historical_var(window, self.config.var_confidence)
    }
}

/// Side of the order that shrinks a position of the given sign.
pub fn reducing_side(quantity: f64) -> Side {
    if quantity > 0.0 {
        Side::Sell
    } else {
        Side::Buy
    }
}

fn position_pct(quantity: f64, price: f64, equity: f64) -> f64 {
    let exposure = (quantity * price).abs();
    if exposure == 0.0 {
        0.0
    } else if equity <= 0.0 {
        f64::INFINITY
    } else {
        exposure / equity
    }
}

fn exposures(snapshot: &PortfolioSnapshot) -> BTreeMap<String, f64> {
    snapshot
        .open_positions()
        .map(|p| (p.symbol.clone(), p.market_value().abs()))
        .collect()
}

/// Share of `symbol` in gross exposure; `None` unless at least two
/// instruments carry exposure.
fn concentration(exposures: &BTreeMap<String, f64>, symbol: &str) -> Option<f64> {
    let held = exposures.values().filter(|e| **e > 0.0).count();
    let gross: f64 = exposures.values().sum();
    if held < 2 || gross <= 0.0 {
        return None;
    }
    exposures.get(symbol).map(|e| e / gross)
}

/// Units to cut from `held` so that at most `target` remain. Whole-unit
/// holdings are trimmed in whole units.
fn reduction_to(held: f64, target: f64) -> f64 {
    let excess = (held - target.max(0.0)).max(0.0);
    let units = if held.fract() == 0.0 {
        (excess - 1e-9).ceil().max(0.0)
    } else {
        excess
    };
    units.min(held)
}
