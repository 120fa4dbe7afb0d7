use crate::domain::ids::{FillId, OrderId};
use crate::domain::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution of (part of) an order.
///
/// `quantity` is signed: positive for buys, negative for sells. `price`
/// already includes slippage; `slippage` is the per-unit adverse move from
/// `reference_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub slippage: f64,
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    /// Quantity was capped by available bar liquidity.
    pub liquidity_limited: bool,
}

impl Fill {
    pub fn side(&self) -> Side {
        if self.quantity >= 0.0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.price
    }

    /// Cash change caused by this fill (negative for buys).
    pub fn cash_flow(&self) -> f64 {
        -(self.quantity * self.price) - self.fee
    }

    /// Total cost of slippage in currency units.
    pub fn slippage_cost(&self) -> f64 {
        self.slippage * self.quantity.abs()
    }
}
