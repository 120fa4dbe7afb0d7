//! Algorithmic slicing for TWAP, VWAP and PARTICIPATE parents.
//!
//! TWAP and VWAP plans are fixed at acceptance: one slice per bar over the
//! horizon, starting on the step after acceptance. PARTICIPATE releases a
//! slice on every bar, capped by that bar's volume, until the parent is done
//! or the extended horizon runs out.

use crate::domain::{AlgoStrategy, OrderId, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoConfig {
    /// Default share of bar volume a PARTICIPATE slice may take.
    pub participation_cap: f64,
    /// A PARTICIPATE schedule may run for at most `horizon * max_extension` bars.
    pub max_extension: usize,
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self {
            participation_cap: 0.1,
            max_extension: 3,
        }
    }
}

/// Split `total` into slices proportional to `weights`.
///
/// Whole-unit totals stay whole-unit: slices are differences of the floored
/// cumulative targets, so they always sum to exactly `total`. Zero or empty
/// weights fall back to an even split.
pub fn split_by_weights(total: f64, weights: &[f64]) -> Vec<f64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let weight_sum: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    let even = weight_sum <= 0.0;
    let whole = total.fract() == 0.0;

    let mut slices = Vec::with_capacity(n);
    let mut cum_weight = 0.0;
    let mut allocated = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cum_weight += if even {
            1.0
        } else if w.is_finite() && *w > 0.0 {
            *w
        } else {
            0.0
        };
        let target = if i + 1 == n {
            total
        } else {
            let share = if even { cum_weight / n as f64 } else { cum_weight / weight_sum };
            let raw = total * share;
            if whole {
                raw.floor()
            } else {
                raw
            }
        };
        slices.push(target - allocated);
        allocated = target;
    }
    slices
}

/// Slicing plan and progress for one algo parent.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgoSchedule {
    pub parent_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub strategy: AlgoStrategy,
    pub limit_price: Option<f64>,
    pub total_quantity: f64,
    /// Step of the first slice.
    pub start_step: usize,
    /// Planned quantity per slice.
    pub base_slice: f64,
    /// Effective volume cap for PARTICIPATE.
    pub rate: f64,
    /// Last step on which a slice may be released.
    pub last_step: usize,
}

impl AlgoSchedule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        strategy: AlgoStrategy,
        limit_price: Option<f64>,
        total_quantity: f64,
        accepted_step: usize,
        config: &AlgoConfig,
    ) -> Self {
        let horizon = strategy.horizon().max(1);
        let start_step = accepted_step + 1;
        let (rate, span) = match strategy {
            AlgoStrategy::Participate { rate, .. } => (
                rate.unwrap_or(config.participation_cap),
                horizon * config.max_extension.max(1),
            ),
            AlgoStrategy::Twap { .. } | AlgoStrategy::Vwap { .. } => (1.0, horizon),
        };
        let base_slice = if total_quantity.fract() == 0.0 {
            (total_quantity / horizon as f64).ceil()
        } else {
            total_quantity / horizon as f64
        };
        Self {
            parent_id,
            symbol: symbol.into(),
            side,
            strategy,
            limit_price,
            total_quantity,
            start_step,
            base_slice,
            rate,
            last_step: start_step + span - 1,
        }
    }

    /// Fixed slice plan for TWAP/VWAP; `volumes` is the instrument's trailing
    /// volume history, most recent last. Empty for PARTICIPATE.
    pub fn planned_slices(&self, volumes: &[f64]) -> Vec<f64> {
        let horizon = self.strategy.horizon().max(1);
        match self.strategy {
            AlgoStrategy::Twap { .. } => split_by_weights(self.total_quantity, &vec![1.0; horizon]),
            AlgoStrategy::Vwap { .. } => {
                let mut weights = vec![0.0; horizon];
                let tail = &volumes[volumes.len().saturating_sub(horizon)..];
                let offset = horizon - tail.len();
                weights[offset..].copy_from_slice(tail);
                // A profile shorter than the horizon leaves leading zero weights;
                // those slots fall back to the profile's mean.
                if offset > 0 && !tail.is_empty() {
                    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
                    for w in &mut weights[..offset] {
                        *w = mean;
                    }
                }
                split_by_weights(self.total_quantity, &weights)
            }
            AlgoStrategy::Participate { .. } => Vec::new(),
        }
    }

    /// Quantity of the PARTICIPATE slice to release on a bar.
    ///
    /// `outstanding` is the quantity already filled or resting in live children.
    /// Returns `None` when nothing should be released.
    pub fn participate_slice(&self, step: usize, bar_volume: f64, outstanding: f64) -> Option<f64> {
        if step < self.start_step || step > self.last_step {
            return None;
        }
        let unreleased = self.total_quantity - outstanding;
        let mut qty = self.base_slice.min(unreleased).min(self.rate * bar_volume.max(0.0));
        if self.total_quantity.fract() == 0.0 {
            qty = qty.floor();
        }
        (qty > 1e-9).then_some(qty)
    }

    pub fn is_exhausted(&self, step: usize) -> bool {
        step >= self.last_step
    }
}
