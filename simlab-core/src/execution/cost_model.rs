//! Cost model: size-dependent slippage and commission.
//!
//! Slippage is directional: buyers pay more, sellers receive less. The
//! slippage fraction grows linearly with the order's share of bar volume, so
//! larger orders never get a better price than smaller ones on the same bar.

use crate::domain::Side;
use serde::{Deserialize, Serialize};

/// Execution friction applied to market-style fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Fixed slippage in basis points.
    pub slippage_bps: f64,
    /// Additional slippage fraction per unit of participation (qty / volume).
    pub impact: f64,
    /// Flat commission per fill.
    pub commission_flat: f64,
    /// Commission as a fraction of fill notional.
    pub commission_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            slippage_bps: 5.0,
            impact: 0.1,
            commission_flat: 1.0,
            commission_rate: 0.0,
        }
    }
}

impl CostModel {
    pub fn new(slippage_bps: f64, impact: f64, commission_flat: f64, commission_rate: f64) -> Self {
        Self {
            slippage_bps,
            impact,
            commission_flat,
            commission_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Slippage as a fraction of the reference price.
    ///
    /// Participation is treated as 1.0 when the bar has no volume.
    pub fn slippage_fraction(&self, quantity: f64, bar_volume: f64) -> f64 {
        let participation = if bar_volume > 0.0 {
            quantity.abs() / bar_volume
        } else {
            1.0
        };
        self.slippage_bps / 10_000.0 + self.impact * participation
    }

    /// Apply slippage to a reference price.
    ///
    /// Returns `(fill_price, per_unit_slippage)`; the slippage amount is
    /// always non-negative.
    pub fn apply_slippage(
        &self,
        reference_price: f64,
        side: Side,
        quantity: f64,
        bar_volume: f64,
    ) -> (f64, f64) {
        let fraction = self.slippage_fraction(quantity, bar_volume);
        if fraction == 0.0 {
            return (reference_price, 0.0);
        }
        let slip = reference_price * fraction;
        match side {
            Side::Buy => (reference_price + slip, slip),
            // A sell never fills at a non-positive price.
            Side::Sell => {
                let price = (reference_price - slip).max(f64::EPSILON);
                (price, reference_price - price)
            }
        }
    }

    /// `commission = flat + rate * price * |quantity|`
    pub fn commission(&self, fill_price: f64, quantity: f64) -> f64 {
        self.commission_flat + self.commission_rate * fill_price * quantity.abs()
    }
}
