use crate::domain::order::{OrderRequest, Side, TimeInForce};
use serde::{Deserialize, Serialize};

/// How big a strategy wants an order to be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalSize {
    /// Absolute number of units.
    Quantity(f64),
    /// Fraction of current equity, converted to whole units at the bar close.
    Weight(f64),
}

/// A strategy's request for one order (or linked order group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub size: SignalSize,
    pub request: OrderRequest,
    pub time_in_force: TimeInForce,
}

impl Signal {
    pub fn market(symbol: impl Into<String>, side: Side, size: SignalSize) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            request: OrderRequest::market(),
            time_in_force: TimeInForce::Gtc,
        }
    }

    pub fn with_request(mut self, request: OrderRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}
