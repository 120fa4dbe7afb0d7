use super::{BarHistory, Strategy};
use crate::domain::{Side, Signal, SignalSize};
use crate::ledger::PortfolioSnapshot;

/// Buys each traded symbol once, splitting `weight` of equity evenly, then holds.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    pub weight: f64,
}

impl Default for BuyAndHold {
    fn default() -> Self {
        Self { weight: 0.95 }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn generate_signals(&self, history: &BarHistory, portfolio: &PortfolioSnapshot) -> Vec<Signal> {
        let symbols: Vec<&str> = history.symbols().collect();
        if symbols.is_empty() {
            return Vec::new();
        }
        let per_symbol = self.weight / symbols.len() as f64;
        symbols
            .into_iter()
            .filter(|s| history.current(s).is_some() && portfolio.quantity(s) == 0.0)
            // Enter only on the first bar seen for the symbol.
            .filter(|s| history.bars(s).len() == 1)
            .map(|s| Signal::market(s, Side::Buy, SignalSize::Weight(per_symbol)))
            .collect()
    }
}
