//! Liquidity constraint for resting limit orders.
//!
//! A limit order can take at most a fixed fraction of a bar's volume. Whatever
//! exceeds the cap stays on the book for later bars.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPolicy {
    /// Maximum fraction of bar volume a single order may fill (0.0 to 1.0].
    pub available_fraction: f64,
}

impl Default for LiquidityPolicy {
    fn default() -> Self {
        Self {
            available_fraction: 0.1,
        }
    }
}

impl LiquidityPolicy {
    pub fn new(available_fraction: f64) -> Self {
        Self { available_fraction }
    }

    pub fn max_fill_qty(&self, bar_volume: f64) -> f64 {
        bar_volume.max(0.0) * self.available_fraction
    }

    /// Returns `(fill_qty, remainder_qty)`. If no constraint binds,
    /// `remainder_qty` is zero.
    pub fn constrain(&self, desired_qty: f64, bar_volume: f64) -> (f64, f64) {
        let max_qty = self.max_fill_qty(bar_volume);
        if desired_qty <= max_qty {
            (desired_qty, 0.0)
        } else {
            (max_qty, desired_qty - max_qty)
        }
    }
}
