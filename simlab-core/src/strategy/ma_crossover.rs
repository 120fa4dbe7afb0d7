use super::{BarHistory, Strategy};
use crate::domain::{Side, Signal, SignalSize};
use crate::ledger::PortfolioSnapshot;
use serde::{Deserialize, Serialize};

/// Long-only moving-average crossover.
///
/// Enters with `weight` of equity when the fast SMA crosses above the slow
/// SMA and exits the whole position when it crosses back below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaCrossover {
    pub fast: usize,
    pub slow: usize,
    pub weight: f64,
}

impl MaCrossover {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast,
            slow,
            weight: 0.5,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

fn sma(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn generate_signals(&self, history: &BarHistory, portfolio: &PortfolioSnapshot) -> Vec<Signal> {
        if self.fast == 0 || self.fast >= self.slow {
            return Vec::new();
        }
        let mut signals = Vec::new();
        let symbols: Vec<String> = history.symbols().map(str::to_string).collect();
        for symbol in symbols {
            if history.current(&symbol).is_none() {
                continue;
            }
            let closes = history.closes(&symbol, self.slow + 1);
            if closes.len() < self.slow + 1 {
                continue;
            }
            let (prev, now) = (&closes[..self.slow], &closes[1..]);
            let fast_prev = sma(&prev[prev.len() - self.fast..]);
            let slow_prev = sma(prev);
            let fast_now = sma(&now[now.len() - self.fast..]);
            let slow_now = sma(now);

            let held = portfolio.quantity(&symbol);
            if fast_prev <= slow_prev && fast_now > slow_now && held == 0.0 {
                signals.push(Signal::market(&symbol, Side::Buy, SignalSize::Weight(self.weight)));
            } else if fast_prev >= slow_prev && fast_now < slow_now && held > 0.0 {
                signals.push(Signal::market(&symbol, Side::Sell, SignalSize::Quantity(held)));
            }
        }
        signals
    }
}
