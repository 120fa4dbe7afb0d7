//! Run lifecycle, fatal errors and run result types.

use crate::domain::{EquityPoint, Fill, Order, OrderAuditEntry, TradeRecord};
use crate::engine::feed::FeedError;
use crate::execution::{OrderBookError, OrderError};
use crate::ledger::{LedgerError, PortfolioSnapshot};
use crate::risk::AlertEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Orchestrator state machine: Initialized → Running → Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Initialized,
    Running,
    Completed,
    Failed,
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("data gap or disorder: {0}")]
    DataGapOrDisorder(#[from] FeedError),

    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(#[from] LedgerError),

    #[error("order book: {0}")]
    OrderBook(#[from] OrderBookError),

    #[error("execution: {0}")]
    Execution(String),
}

impl From<OrderError> for FatalError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Book(e) => FatalError::OrderBook(e),
            // Resting orders were validated at submission; seeing this here
            // means the book holds an order it should have refused.
            OrderError::InvalidOrderParameters(msg) => FatalError::Execution(msg),
        }
    }
}

impl FatalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FatalError::DataGapOrDisorder(_) => FailureKind::DataGapOrDisorder,
            FatalError::LedgerInconsistency(_) => FailureKind::LedgerInconsistency,
            FatalError::OrderBook(_) | FatalError::Execution(_) => FailureKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    DataGapOrDisorder,
    LedgerInconsistency,
    Internal,
}

/// Where and why a run stopped, with the portfolio as it stood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub step: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: FailureKind,
    pub error: String,
    pub snapshot: PortfolioSnapshot,
}

/// Everything a run produced, complete or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub failure: Option<RunFailure>,
    pub strategy: String,
    pub initial_capital: f64,
    /// Steps fully processed.
    pub steps: usize,
    pub fills: Vec<Fill>,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub alerts: Vec<AlertEvent>,
    pub orders: Vec<Order>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub final_snapshot: PortfolioSnapshot,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.initial_capital, |p| p.equity)
    }
}
