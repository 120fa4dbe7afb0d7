//! SimLab Runner: configuration, analysis, reports, data and sweeps.
//!
//! This crate builds on `simlab-core` to provide:
//! - TOML run configuration with content-hashed run ids
//! - CSV bar loading and deterministic synthetic bars
//! - Single-run reports with performance analysis
//! - Parallel parameter sweeps
//! - JSON, CSV and Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, RunId, SimConfig, StrategyConfig};
pub use data_loader::{load_feed, LoadError, LoadedData};
pub use metrics::{AnalysisConfig, PerformanceReport, ReturnKind};
pub use runner::{run_from_config, run_with_feed, BacktestReport, RunError, SCHEMA_VERSION};
pub use sweep::{run_sweep, ParamGrid, SweepResults};
