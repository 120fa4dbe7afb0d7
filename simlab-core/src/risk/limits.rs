//! Risk limit definitions and alert records.

use crate::domain::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    #[default]
    Global,
    Instrument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitKind {
    /// `|position| * price / equity`
    MaxPositionPct,
    /// Share of one instrument in gross exposure.
    MaxConcentrationPct,
    /// Historical VaR of the equity curve.
    VarCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitPolicy {
    /// Alert only.
    #[default]
    Soft,
    /// Block risk-increasing orders.
    Hard,
}

/// A single configured limit. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    #[serde(default)]
    pub scope: LimitScope,
    pub kind: LimitKind,
    pub threshold: f64,
    #[serde(default)]
    pub policy: LimitPolicy,
    /// Submit a forced reduction when this hard limit is breached.
    #[serde(default)]
    pub trim: bool,
}

impl RiskLimit {
    pub fn new(kind: LimitKind, threshold: f64, policy: LimitPolicy) -> Self {
        Self {
            scope: LimitScope::Global,
            kind,
            threshold,
            policy,
            trim: false,
        }
    }

    pub fn for_instrument(mut self, symbol: impl Into<String>) -> Self {
        self.scope = LimitScope::Instrument(symbol.into());
        self
    }

    pub fn with_trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn applies_to(&self, symbol: &str) -> bool {
        match &self.scope {
            LimitScope::Global => true,
            LimitScope::Instrument(s) => s == symbol,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.policy == LimitPolicy::Hard
    }
}

/// A limit observed above its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub kind: LimitKind,
    pub policy: LimitPolicy,
    pub symbol: Option<String>,
    pub observed: f64,
    pub threshold: f64,
}

impl Breach {
    pub fn describe(&self) -> String {
        let what = match self.kind {
            LimitKind::MaxPositionPct => "position size",
            LimitKind::MaxConcentrationPct => "concentration",
            LimitKind::VarCeiling => "VaR",
        };
        match &self.symbol {
            Some(symbol) => format!(
                "{what} of {symbol} at {:.4} exceeds {:.4}",
                self.observed, self.threshold
            ),
            None => format!("{what} at {:.4} exceeds {:.4}", self.observed, self.threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    MaxPositionPct,
    MaxConcentrationPct,
    VarCeiling,
    BuyingPower,
    InvalidOrder,
    LimitCleared,
}

impl From<LimitKind> for AlertKind {
    fn from(kind: LimitKind) -> Self {
        match kind {
            LimitKind::MaxPositionPct => AlertKind::MaxPositionPct,
            LimitKind::MaxConcentrationPct => AlertKind::MaxConcentrationPct,
            LimitKind::VarCeiling => AlertKind::VarCeiling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub kind: AlertKind,
    pub symbol: Option<String>,
    pub observed: f64,
    pub threshold: f64,
    pub message: String,
    pub order_id: Option<OrderId>,
    /// Units the orchestrator should sell (long) or buy back (short).
    pub forced_reduction: Option<f64>,
}
