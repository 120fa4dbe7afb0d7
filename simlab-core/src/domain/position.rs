use serde::{Deserialize, Serialize};

/// Net holding in one instrument, tracked at weighted-average cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed quantity: positive long, negative short.
    pub quantity: f64,
    pub avg_cost: f64,
    /// Cumulative realized P&L for this symbol, gross of fees.
    pub realized_pnl: f64,
    pub last_price: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_cost: 0.0,
            realized_pnl: 0.0,
            last_price,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity * (self.last_price - self.avg_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_and_short_pnl() {
        let long = Position {
            symbol: "SPY".into(),
            quantity: 10.0,
            avg_cost: 100.0,
            realized_pnl: 0.0,
            last_price: 105.0,
        };
        assert!(long.is_long());
        assert_eq!(long.market_value(), 1050.0);
        assert_eq!(long.unrealized_pnl(), 50.0);

        let short = Position {
            quantity: -10.0,
            ..long
        };
        assert!(short.is_short());
        assert_eq!(short.market_value(), -1050.0);
        assert_eq!(short.unrealized_pnl(), -50.0);
    }

    #[test]
    fn flat_position_has_no_exposure() {
        let pos = Position::flat("QQQ", 300.0);
        assert!(pos.is_flat());
        assert_eq!(pos.market_value(), 0.0);
        assert_eq!(pos.unrealized_pnl(), 0.0);
    }
}
