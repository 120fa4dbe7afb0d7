use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portfolio valuation at the end of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub positions_value: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub fees: f64,
}

impl EquityPoint {
    /// Gap between mark-to-market equity and the P&L decomposition.
    pub fn identity_gap(&self, initial_capital: f64) -> f64 {
        let decomposed = initial_capital + self.realized_pnl + self.unrealized_pnl - self.fees;
        self.equity - decomposed
    }
}
