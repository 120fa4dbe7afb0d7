//! Order types, linked-order roles, lifecycle states and the audit trail.
//!
//! Order variety is a sum type: `OrderType` covers what a single resting order
//! does on a bar, while `OrderRequest` covers what a strategy asks for
//! (single order, OCO pair, bracket, or an algorithmic parent). Linked orders
//! never reference each other directly; they share a `GroupId` or `parent_id`
//! and the order book keeps the index from group to members.

use super::ids::{GroupId, OrderId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Validity window of an order, counted in simulated bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good until cancelled.
    #[default]
    Gtc,
    /// Valid for its first eligible bar only.
    Day,
    /// Valid for `n` bars starting at its first eligible bar.
    Bars(usize),
}

impl TimeInForce {
    /// Last step on which an order first eligible at `eligible_step` may still fill.
    pub fn expiry_step(self, eligible_step: usize) -> Option<usize> {
        match self {
            TimeInForce::Gtc => None,
            TimeInForce::Day => Some(eligible_step),
            TimeInForce::Bars(n) => Some(eligible_step + n.max(1) - 1),
        }
    }
}

/// Fixed trailing distance for a trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrailDistance {
    /// Price units.
    Absolute(f64),
    /// Fraction of the extreme price (0.05 = 5%).
    Percent(f64),
}

impl TrailDistance {
    /// Stop level implied by `extreme` for an exit order on `side`.
    ///
    /// A sell stop protects a long and trails below the highest high; a buy
    /// stop protects a short and trails above the lowest low.
    pub fn stop_from(self, extreme: f64, side: Side) -> f64 {
        match (self, side) {
            (TrailDistance::Absolute(d), Side::Sell) => extreme - d,
            (TrailDistance::Absolute(d), Side::Buy) => extreme + d,
            (TrailDistance::Percent(p), Side::Sell) => extreme * (1.0 - p),
            (TrailDistance::Percent(p), Side::Buy) => extreme * (1.0 + p),
        }
    }

    pub fn value(self) -> f64 {
        match self {
            TrailDistance::Absolute(d) | TrailDistance::Percent(d) => d,
        }
    }
}

/// What a single order does on a bar, with its type-specific price fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill fully at the bar's reference price plus slippage.
    Market,
    /// Fill at exactly the limit price once the bar's range crosses it.
    Limit { limit_price: f64 },
    /// Convert to market once the bar's range crosses the stop.
    Stop { stop_price: f64 },
    /// Stop that ratchets behind the most favorable price seen since entry.
    TrailingStop {
        trail: TrailDistance,
        extreme_price: f64,
        stop_price: f64,
    },
}

impl OrderType {
    /// Stop level for stop-type orders.
    pub fn stop_price(&self) -> Option<f64> {
        match self {
            OrderType::Stop { stop_price } | OrderType::TrailingStop { stop_price, .. } => {
                Some(*stop_price)
            }
            OrderType::Market | OrderType::Limit { .. } => None,
        }
    }
}

/// Single-order shape a strategy can request, before it becomes an `OrderType`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LegType {
    Market,
    Limit { limit_price: f64 },
    Stop { stop_price: f64 },
    TrailingStop { trail: TrailDistance },
}

impl LegType {
    /// Materialize the leg. Trailing stops seed their extreme at `reference_price`.
    pub fn to_order_type(self, side: Side, reference_price: f64) -> OrderType {
        match self {
            LegType::Market => OrderType::Market,
            LegType::Limit { limit_price } => OrderType::Limit { limit_price },
            LegType::Stop { stop_price } => OrderType::Stop { stop_price },
            LegType::TrailingStop { trail } => OrderType::TrailingStop {
                trail,
                extreme_price: reference_price,
                stop_price: trail.stop_from(reference_price, side),
            },
        }
    }

    /// The limit or stop price the leg names, if any.
    pub fn price(self) -> Option<f64> {
        match self {
            LegType::Limit { limit_price } => Some(limit_price),
            LegType::Stop { stop_price } => Some(stop_price),
            LegType::Market | LegType::TrailingStop { .. } => None,
        }
    }

    pub fn kind(self) -> OrderKind {
        match self {
            LegType::Market => OrderKind::Market,
            LegType::Limit { .. } => OrderKind::Limit,
            LegType::Stop { .. } => OrderKind::Stop,
            LegType::TrailingStop { .. } => OrderKind::TrailingStop,
        }
    }
}

/// Algorithmic execution style for a parent order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlgoStrategy {
    /// Even slices, one per bar over `horizon` bars.
    Twap { horizon: usize },
    /// Slices weighted by the instrument's trailing volume profile.
    Vwap { horizon: usize },
    /// Even slices capped at `rate` of each bar's volume; the horizon extends
    /// while the cap binds. `None` uses the configured participation cap.
    Participate { horizon: usize, rate: Option<f64> },
}

impl AlgoStrategy {
    pub fn horizon(self) -> usize {
        match self {
            AlgoStrategy::Twap { horizon }
            | AlgoStrategy::Vwap { horizon }
            | AlgoStrategy::Participate { horizon, .. } => horizon,
        }
    }
}

/// Everything a strategy can ask the simulator for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderRequest {
    Single(LegType),
    /// Two legs on the same side and quantity; the first fill cancels the other.
    Oco { first: LegType, second: LegType },
    /// Entry plus a take-profit limit and stop-loss stop on the opposite side.
    Bracket {
        entry: LegType,
        take_profit: f64,
        stop_loss: f64,
    },
    /// Parent order sliced into child orders across future bars.
    Algo {
        algo: AlgoStrategy,
        limit_price: Option<f64>,
    },
}

impl OrderRequest {
    pub fn market() -> Self {
        OrderRequest::Single(LegType::Market)
    }

    pub fn limit(limit_price: f64) -> Self {
        OrderRequest::Single(LegType::Limit { limit_price })
    }

    pub fn stop(stop_price: f64) -> Self {
        OrderRequest::Single(LegType::Stop { stop_price })
    }

    pub fn kind(&self) -> OrderKind {
        match self {
            OrderRequest::Single(leg) => leg.kind(),
            OrderRequest::Oco { .. } => OrderKind::Oco,
            OrderRequest::Bracket { .. } => OrderKind::Bracket,
            OrderRequest::Algo { algo, .. } => match algo {
                AlgoStrategy::Twap { .. } => OrderKind::Twap,
                AlgoStrategy::Vwap { .. } => OrderKind::Vwap,
                AlgoStrategy::Participate { .. } => OrderKind::Participate,
            },
        }
    }
}

/// Reporting label for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    Oco,
    Bracket,
    TrailingStop,
    Twap,
    Vwap,
    Participate,
}

/// How an order relates to others in its group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderRole {
    Standalone,
    OcoLeg,
    BracketEntry,
    TakeProfit,
    StopLoss,
    /// Never fills itself; tracks the fills of its children.
    AlgoParent(AlgoStrategy),
    AlgoChild,
    /// Submitted by the risk path to trim a breached hard limit.
    ForcedReduction,
}

/// Order lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Waiting to be triggered or filled (partially filled orders stay here).
    Pending,
    /// Stop crossed and converted to market.
    Triggered,
    /// Completely filled.
    Filled,
    /// Cancelled with a reason (OCO sibling filled, parent cancelled, no cash...).
    Cancelled { reason: String },
    /// Time-in-force ran out.
    Expired,
    /// Refused before reaching the market.
    Rejected { reason: String },
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending | OrderStatus::Triggered)
    }
}

/// A single order in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub role: OrderRole,
    pub quantity: f64,
    pub filled_quantity: f64,
    /// Quantity-weighted average price of all fills so far.
    pub avg_fill_price: f64,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub created_step: usize,
    /// First step on which this order may fill.
    pub eligible_step: usize,
    /// Last step on which this order may fill (from time-in-force).
    pub expires_after: Option<usize>,
    /// Algo parent, or bracket entry for protective children.
    pub parent_id: Option<OrderId>,
    /// OCO group this order belongs to.
    pub group_id: Option<GroupId>,
}

impl Order {
    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_algo_parent(&self) -> bool {
        matches!(self.role, OrderRole::AlgoParent(_))
    }

    /// Whether the order may interact with the market on `step`.
    pub fn is_eligible(&self, step: usize) -> bool {
        self.is_active()
            && !self.is_algo_parent()
            && self.eligible_step <= step
            && self.expires_after.map_or(true, |last| step <= last)
    }

    pub fn kind(&self) -> OrderKind {
        match self.role {
            OrderRole::OcoLeg | OrderRole::TakeProfit | OrderRole::StopLoss => OrderKind::Oco,
            OrderRole::BracketEntry => OrderKind::Bracket,
            OrderRole::AlgoParent(AlgoStrategy::Twap { .. }) => OrderKind::Twap,
            OrderRole::AlgoParent(AlgoStrategy::Vwap { .. }) => OrderKind::Vwap,
            OrderRole::AlgoParent(AlgoStrategy::Participate { .. }) => OrderKind::Participate,
            OrderRole::Standalone | OrderRole::AlgoChild | OrderRole::ForcedReduction => {
                match self.order_type {
                    OrderType::Market => OrderKind::Market,
                    OrderType::Limit { .. } => OrderKind::Limit,
                    OrderType::Stop { .. } => OrderKind::Stop,
                    OrderType::TrailingStop { .. } => OrderKind::TrailingStop,
                }
            }
        }
    }
}

/// A sized, not yet accepted order request.
///
/// Built by the orchestrator from a strategy signal (or by the risk path for a
/// forced reduction); checked by the risk manager; consumed by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub request: OrderRequest,
    pub time_in_force: TimeInForce,
    pub forced: bool,
}

impl OrderTicket {
    pub fn new(symbol: impl Into<String>, side: Side, quantity: f64, request: OrderRequest) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            request,
            time_in_force: TimeInForce::Gtc,
            forced: false,
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self::new(symbol, side, quantity, OrderRequest::market())
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Price to value the ticket at before it is accepted: the limit or stop
    /// price the request names, otherwise `close`.
    pub fn reference_price(&self, close: f64) -> f64 {
        let named = match self.request {
            OrderRequest::Single(leg) | OrderRequest::Bracket { entry: leg, .. } => leg.price(),
            OrderRequest::Oco { first, second } => first.price().or(second.price()),
            OrderRequest::Algo { limit_price, .. } => limit_price,
        };
        named.unwrap_or(close)
    }

    /// Signed quantity this ticket would add to the position if fully filled.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub step: usize,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub reason: String,
}
