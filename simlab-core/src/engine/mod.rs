//! Backtest orchestrator: feeds, run configuration, the per-step loop and
//! the run result.
//!
//! Per global step the loop runs:
//!
//! 1. Data: merge and validate the next bars
//! 2. Execution: resting orders meet the bars
//! 3. Decision: strategy signals are sized, risk-checked and submitted
//! 4. Post-step: risk monitoring, forced reductions, equity accounting

pub mod config;
pub mod feed;
pub mod loop_runner;
pub mod state;

pub use config::EngineConfig;
pub use feed::{BarFeed, FeedError, MergedFeed, VecFeed};
pub use loop_runner::{run_backtest, Backtest};
pub use state::{FailureKind, FatalError, RunFailure, RunResult, RunStatus};
