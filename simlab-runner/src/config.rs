//! TOML run configuration.
//!
//! A `SimConfig` captures everything needed to reproduce a run: capital and
//! data source, execution costs, algo defaults, risk limits, analyzer
//! settings and the strategy with its parameters. Every field has a default,
//! so an empty document is a valid configuration.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use simlab_core::engine::EngineConfig;
use simlab_core::execution::{AlgoConfig, CostModel, ExecutionConfig, LiquidityPolicy};
use simlab_core::risk::RiskConfig;
use simlab_core::strategy::{BuyAndHold, MaCrossover, NullStrategy, Strategy};
use thiserror::Error;

use crate::metrics::AnalysisConfig;

/// Content hash of a configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.into()))
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub run: RunSection,
    pub execution: ExecutionSection,
    pub algo: AlgoConfig,
    pub risk: RiskConfig,
    pub analysis: AnalysisConfig,
    pub strategy: StrategyConfig,
}

/// `[run]`: capital and data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub initial_capital: f64,
    pub cash_floor: f64,
    /// CSV bar file. Synthetic bars are generated when absent.
    pub data: Option<PathBuf>,
    /// Symbols to trade; empty means every symbol in the data file.
    pub symbols: Vec<String>,
    pub synthetic_bars: usize,
    pub synthetic_start: NaiveDate,
    pub seed: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            cash_floor: 0.0,
            data: None,
            symbols: vec!["SPY".to_string()],
            synthetic_bars: 252,
            synthetic_start: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default(),
            seed: 42,
        }
    }
}

/// `[execution]`: cost model and liquidity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub slippage_bps: f64,
    pub impact: f64,
    pub commission_flat: f64,
    pub commission_rate: f64,
    /// Share of bar volume a resting limit order may take.
    pub liquidity_fraction: f64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let cost = CostModel::default();
        Self {
            slippage_bps: cost.slippage_bps,
            impact: cost.impact,
            commission_flat: cost.commission_flat,
            commission_rate: cost.commission_rate,
            liquidity_fraction: LiquidityPolicy::default().available_fraction,
        }
    }
}

/// `[strategy]`: which reference strategy to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    BuyAndHold {
        #[serde(default = "default_hold_weight")]
        weight: f64,
    },
    MaCrossover {
        fast: usize,
        slow: usize,
        #[serde(default = "default_crossover_weight")]
        weight: f64,
    },
    Null,
}

fn default_hold_weight() -> f64 {
    BuyAndHold::default().weight
}

fn default_crossover_weight() -> f64 {
    MaCrossover::new(1, 2).weight
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::MaCrossover {
            fast: 10,
            slow: 30,
            weight: default_crossover_weight(),
        }
    }
}

impl StrategyConfig {
    /// Instantiate a fresh strategy; each run gets its own.
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::BuyAndHold { weight } => Box::new(BuyAndHold { weight: *weight }),
            StrategyConfig::MaCrossover { fast, slow, weight } => {
                Box::new(MaCrossover::new(*fast, *slow).with_weight(*weight))
            }
            StrategyConfig::Null => Box::new(NullStrategy),
        }
    }

    pub fn label(&self) -> String {
        match self {
            StrategyConfig::BuyAndHold { weight } => format!("buy_and_hold({weight})"),
            StrategyConfig::MaCrossover { fast, slow, weight } => {
                format!("ma_crossover({fast},{slow},{weight})")
            }
            StrategyConfig::Null => "null".to_string(),
        }
    }
}

impl SimConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deterministic id: BLAKE3 of the canonical JSON form. Identical
    /// configurations share an id.
    pub fn run_id(&self) -> RunId {
        // Plain data with string keys; serialization cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        let e = &self.execution;
        ExecutionConfig {
            cost_model: CostModel::new(e.slippage_bps, e.impact, e.commission_flat, e.commission_rate),
            liquidity: LiquidityPolicy::new(e.liquidity_fraction),
            algo: self.algo.clone(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.run.initial_capital)
            .with_cash_floor(self.run.cash_floor)
            .with_execution(self.execution_config())
            .with_risk(self.risk.clone())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let run = &self.run;
        if !(run.initial_capital.is_finite() && run.initial_capital > 0.0) {
            return invalid(format!("initial_capital must be positive, got {}", run.initial_capital));
        }
        if !(run.cash_floor >= 0.0 && run.cash_floor < run.initial_capital) {
            return invalid(format!(
                "cash_floor {} must lie in [0, initial_capital)",
                run.cash_floor
            ));
        }
        if run.data.is_none() && run.synthetic_bars == 0 {
            return invalid("no data file and synthetic_bars = 0");
        }

        let e = &self.execution;
        for (name, value) in [
            ("slippage_bps", e.slippage_bps),
            ("impact", e.impact),
            ("commission_flat", e.commission_flat),
            ("commission_rate", e.commission_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("execution.{name} must be non-negative, got {value}"));
            }
        }
        if !(e.liquidity_fraction > 0.0 && e.liquidity_fraction <= 1.0) {
            return invalid(format!("liquidity_fraction {} outside (0, 1]", e.liquidity_fraction));
        }

        if !(self.algo.participation_cap > 0.0 && self.algo.participation_cap <= 1.0) {
            return invalid(format!(
                "participation_cap {} outside (0, 1]",
                self.algo.participation_cap
            ));
        }
        if self.algo.max_extension == 0 {
            return invalid("algo.max_extension must be at least 1");
        }

        let risk = &self.risk;
        if !(risk.var_confidence > 0.0 && risk.var_confidence < 1.0) {
            return invalid(format!("var_confidence {} outside (0, 1)", risk.var_confidence));
        }
        if risk.var_window == 0 {
            return invalid("var_window must be at least 1");
        }
        if let Some(limit) = risk.limits.iter().find(|l| !(l.threshold.is_finite() && l.threshold > 0.0)) {
            return invalid(format!("{:?} threshold must be positive, got {}", limit.kind, limit.threshold));
        }

        if !(self.analysis.periods_per_year > 0.0) {
            return invalid("analysis.periods_per_year must be positive");
        }
        if !(self.analysis.var_confidence > 0.0 && self.analysis.var_confidence < 1.0) {
            return invalid(format!(
                "analysis.var_confidence {} outside (0, 1)",
                self.analysis.var_confidence
            ));
        }

        match self.strategy {
            StrategyConfig::MaCrossover { fast, slow, weight } => {
                if fast == 0 || fast >= slow {
                    return invalid(format!("ma_crossover needs 0 < fast < slow, got {fast}/{slow}"));
                }
                check_weight(weight)
            }
            StrategyConfig::BuyAndHold { weight } => check_weight(weight),
            StrategyConfig::Null => Ok(()),
        }
    }
}

fn check_weight(weight: f64) -> Result<(), ConfigError> {
    if weight > 0.0 && weight <= 1.0 {
        Ok(())
    } else {
        invalid(format!("strategy weight {weight} outside (0, 1]"))
    }
}
