use crate::domain::ids::FillId;
use crate::domain::order::Side;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed (or partially closed) round trip, produced by every
/// position-reducing fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    /// Direction of the position that was closed.
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Gross of fees.
    pub realized_pnl: f64,
    /// Fee of the closing fill.
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    pub fill_id: FillId,
}

impl TradeRecord {
    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl - self.fee
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }

    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.side.sign() * (self.exit_price - self.entry_price) / self.entry_price
    }
}
