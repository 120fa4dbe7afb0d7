//! Strategy boundary: the pluggable signal source.
//!
//! A strategy sees only the bars up to and including the current step plus a
//! snapshot of the portfolio, and answers with signals. Sizing, risk checks
//! and execution happen downstream.

pub mod buy_and_hold;
pub mod ma_crossover;
pub mod scripted;

pub use buy_and_hold::BuyAndHold;
pub use ma_crossover::MaCrossover;
pub use scripted::Scripted;

use crate::domain::{Bar, Signal};
use crate::ledger::PortfolioSnapshot;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn generate_signals(&self, history: &BarHistory, portfolio: &PortfolioSnapshot) -> Vec<Signal>;
}

/// Bars visible to the strategy: everything up to the current step.
#[derive(Debug, Clone, Default)]
pub struct BarHistory {
    timestamps: Vec<DateTime<Utc>>,
    bars: BTreeMap<String, Vec<Bar>>,
}

impl BarHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one global step.
    pub fn push_step(&mut self, timestamp: DateTime<Utc>, bars: &[Bar]) {
        self.timestamps.push(timestamp);
        for bar in bars {
            self.bars.entry(bar.symbol.clone()).or_default().push(bar.clone());
        }
    }

    /// Index of the current step, `None` before the first step.
    pub fn step(&self) -> Option<usize> {
        self.timestamps.len().checked_sub(1)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn bars(&self, symbol: &str) -> &[Bar] {
        self.bars.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bar for `symbol` at the current step, if the symbol traded.
    pub fn current(&self, symbol: &str) -> Option<&Bar> {
        let ts = self.timestamp()?;
        self.bars(symbol).last().filter(|b| b.timestamp == ts)
    }

    /// The last `n` closes of `symbol`, oldest first.
    pub fn closes(&self, symbol: &str, n: usize) -> Vec<f64> {
        let bars = self.bars(symbol);
        bars[bars.len().saturating_sub(n)..].iter().map(|b| b.close).collect()
    }
}

/// Never trades.
#[derive(Debug, Clone, Default)]
pub struct NullStrategy;

impl Strategy for NullStrategy {
    fn name(&self) -> &str {
        "null"
    }

    fn generate_signals(&self, _history: &BarHistory, _portfolio: &PortfolioSnapshot) -> Vec<Signal> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(symbol: &str, day: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn history_tracks_current_step() {
        let mut history = BarHistory::new();
        assert_eq!(history.step(), None);

        history.push_step(bar("SPY", 0, 1.0).timestamp, &[bar("SPY", 0, 1.0), bar("QQQ", 0, 2.0)]);
        history.push_step(bar("SPY", 1, 1.5).timestamp, &[bar("SPY", 1, 1.5)]);

        assert_eq!(history.step(), Some(1));
        assert!(history.current("SPY").is_some());
        assert!(history.current("QQQ").is_none());
        assert_eq!(history.closes("SPY", 5), vec![1.0, 1.5]);
        assert_eq!(history.closes("SPY", 1), vec![1.5]);
    }
}
