use super::{BarHistory, Strategy};
use crate::domain::Signal;
use crate::ledger::PortfolioSnapshot;
use std::collections::BTreeMap;

/// Replays a fixed list of signals keyed by step index.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    script: BTreeMap<usize, Vec<Signal>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, step: usize, signal: Signal) -> Self {
        self.script.entry(step).or_default().push(signal);
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_signals(&self, history: &BarHistory, _portfolio: &PortfolioSnapshot) -> Vec<Signal> {
        history
            .step()
            .and_then(|step| self.script.get(&step))
            .cloned()
            .unwrap_or_default()
    }
}
