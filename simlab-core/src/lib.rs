//! SimLab Core: domain types, execution simulator, risk manager, portfolio
//! ledger and the backtest orchestrator.
//!
//! - Domain types (bars, orders, fills, positions, trades, signals)
//! - Execution simulator with triggers, costs, liquidity caps and algo slicing
//! - Pre-trade and post-trade risk checks with historical VaR
//! - Average-cost portfolio ledger with an enforced equity identity
//! - Bar-by-bar orchestrator over a pluggable strategy

pub mod domain;
pub mod engine;
pub mod execution;
pub mod ledger;
pub mod risk;
pub mod strategy;

pub use engine::{run_backtest, EngineConfig, RunResult, RunStatus};
