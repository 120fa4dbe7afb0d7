use crate::execution::ExecutionConfig;
use crate::risk::RiskConfig;
use serde::{Deserialize, Serialize};

/// Immutable configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// No fill may take cash below this level.
    pub cash_floor: f64,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            cash_floor: 0.0,
            execution: ExecutionConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            ..Self::default()
        }
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_cash_floor(mut self, cash_floor: f64) -> Self {
        self.cash_floor = cash_floor;
        self
    }
}
