//! Parameter sweeps over moving-average crossover periods.
//!
//! Every grid point is an independent run: its own strategy, ledger, risk
//! manager and simulator. Only the bar data and the base configuration are
//! shared, both read-only.

use std::collections::HashMap;

use rayon::prelude::*;
use simlab_core::engine::BarFeed;
use simlab_core::strategy::MaCrossover;
use tracing::info;

use crate::config::{ConfigError, SimConfig, StrategyConfig};
use crate::data_loader::dataset_hash;
use crate::runner::{run_loaded, BacktestReport};

/// Fast/slow period ranges to sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub fast_periods: Vec<usize>,
    pub slow_periods: Vec<usize>,
}

impl ParamGrid {
    pub fn new(fast_periods: Vec<usize>, slow_periods: Vec<usize>) -> Self {
        Self {
            fast_periods,
            slow_periods,
        }
    }

    /// Fast 5, 10, 20 against slow 20, 50, 100.
    pub fn ma_crossover_default() -> Self {
        Self::new(vec![5, 10, 20], vec![20, 50, 100])
    }

    /// Raw grid size, invalid pairs included.
    pub fn size(&self) -> usize {
        self.fast_periods.len() * self.slow_periods.len()
    }

    /// One configuration per valid (fast < slow) pair, in grid order.
    ///
    /// The base strategy's weight carries over when it is a crossover.
    pub fn generate_configs(&self, base: &SimConfig) -> Vec<SimConfig> {
        let weight = match base.strategy {
            StrategyConfig::MaCrossover { weight, .. } => weight,
            _ => MaCrossover::new(1, 2).weight,
        };

        let mut configs = Vec::new();
        for &fast in &self.fast_periods {
            for &slow in &self.slow_periods {
                if fast == 0 || fast >= slow {
                    continue;
                }
                let mut config = base.clone();
                config.strategy = StrategyConfig::MaCrossover { fast, slow, weight };
                configs.push(config);
            }
        }
        configs
    }
}

/// Run every grid configuration in parallel against `feed`.
///
/// Results are ordered by run id, so output does not depend on scheduling.
pub fn run_sweep<F>(grid: &ParamGrid, base: &SimConfig, feed: &F) -> Result<SweepResults, ConfigError>
where
    F: BarFeed + Sync,
{
    let configs = grid.generate_configs(base);
    for config in &configs {
        config.validate()?;
    }

    let hash = dataset_hash(feed);
    info!(runs = configs.len(), "sweep started");

    let mut reports: Vec<BacktestReport> = configs
        .par_iter()
        .map(|config| run_loaded(config, feed, &hash, false))
        .collect();
    reports.sort_by(|a, b| a.run_id.cmp(&b.run_id));

    info!(runs = reports.len(), "sweep finished");
    Ok(SweepResults::new(reports))
}

/// Reports from a sweep, sorted by run id.
#[derive(Debug)]
pub struct SweepResults {
    reports: Vec<BacktestReport>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(reports: Vec<BacktestReport>) -> Self {
        let by_run_id = reports
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { reports, by_run_id }
    }

    pub fn all(&self) -> &[BacktestReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestReport> {
        self.by_run_id.get(run_id).map(|&i| &self.reports[i])
    }

    /// Completed runs ranked by Sharpe, best first. Runs without a Sharpe
    /// ratio rank last; ties keep run id order.
    pub fn ranked_by_sharpe(&self) -> Vec<&BacktestReport> {
        let mut ranked: Vec<_> = self.reports.iter().filter(|r| r.is_completed()).collect();
        ranked.sort_by(|a, b| {
            let a = a.performance.sharpe.unwrap_or(f64::NEG_INFINITY);
            let b = b.performance.sharpe.unwrap_or(f64::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    pub fn best_by_sharpe(&self) -> Option<&BacktestReport> {
        self.ranked_by_sharpe().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_skips_invalid_pairs() {
        let grid = ParamGrid::new(vec![5, 20, 50], vec![20, 50]);
        assert_eq!(grid.size(), 6);

        let configs = grid.generate_configs(&SimConfig::default());
        let pairs: Vec<(usize, usize)> = configs
            .iter()
            .map(|c| match c.strategy {
                StrategyConfig::MaCrossover { fast, slow, .. } => (fast, slow),
                _ => panic!("expected crossover"),
            })
            .collect();
        assert_eq!(pairs, vec![(5, 20), (5, 50), (20, 50)]);
    }

    #[test]
    fn grid_keeps_base_weight() {
        let mut base = SimConfig::default();
        base.strategy = StrategyConfig::MaCrossover {
            fast: 2,
            slow: 3,
            weight: 0.8,
        };
        let configs = ParamGrid::ma_crossover_default().generate_configs(&base);
        assert!(configs
            .iter()
            .all(|c| matches!(c.strategy, StrategyConfig::MaCrossover { weight, .. } if weight == 0.8)));
    }

    #[test]
    fn grid_configs_have_distinct_run_ids() {
        let configs = ParamGrid::ma_crossover_default().generate_configs(&SimConfig::default());
        let mut ids: Vec<_> = configs.iter().map(SimConfig::run_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), configs.len());
    }
}
